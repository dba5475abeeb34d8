//! # Makhzan — Dependency Injection Container for Rust
//!
//! مخزن — "The Vault"
//!
//! A powerful, ergonomic IoC container inspired by DIshka, Laravel, and .NET DI.
//!
//! # Quick Start
//! ```rust,ignore
//! use makhzan::prelude::*;
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync { fn log(&self, msg: &str); }
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("[LOG] {msg}"); }
//! }
//!
//! struct UserService { logger: Arc<Box<dyn Logger>> }
//!
//! let mut builder = ContainerBuilder::new(false);
//! builder.register_definition(
//!     "logger",
//!     BeanDefinition::new::<Box<dyn Logger>>(|_| Ok(Box::new(ConsoleLogger) as Box<dyn Logger>)),
//! )?;
//! builder.register_definition(
//!     "userService",
//!     BeanDefinition::new::<UserService>(|r| Ok(UserService { logger: resolve(r)? })),
//! )?;
//!
//! let container = builder.build()?;
//! let service = container.get::<UserService>()?;
//! service.logger.log("It works!");
//! ```

pub use makhzan_container::*;
pub use makhzan_container::prelude;
pub use makhzan_support::rendering;