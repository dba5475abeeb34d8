//! Basic example of the Makhzan IoC container: a singleton chain wired
//! through by-type resolution, with a request-shaped prototype on top.

use std::sync::Arc;

use makhzan::prelude::*;

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

#[derive(Clone)]
struct Config {
    database_url: String,
    debug: bool,
}

struct Database {
    url: String,
    logger: Arc<Box<dyn Logger>>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

struct UserService {
    repo: Arc<UserRepository>,
    logger: Arc<Box<dyn Logger>>,
}

impl UserService {
    fn get_user(&self, id: u64) -> String {
        self.logger.log(&format!("Getting user {id}"));
        self.repo.find_user(id)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("makhzan=debug").init();

    let config = Config { database_url: "postgres://localhost/myapp".to_string(), debug: true };

    let mut builder = ContainerBuilder::new(false);

    builder.register_definition("config", BeanDefinition::new::<Config>(move |_| Ok(config.clone())))?;

    builder.register_definition(
        "logger",
        BeanDefinition::new::<Box<dyn Logger>>(|_| Ok(Box::new(ConsoleLogger) as Box<dyn Logger>)),
    )?;

    builder.register_definition(
        "database",
        BeanDefinition::new::<Database>(|r| {
            let config = resolve::<Config>(r)?;
            let logger = resolve::<Box<dyn Logger>>(r)?;
            Ok(Database { url: config.database_url.clone(), logger })
        }),
    )?;

    builder.register_definition(
        "userRepository",
        BeanDefinition::new::<UserRepository>(|r| Ok(UserRepository { db: resolve::<Database>(r)? })),
    )?;

    builder.register_definition(
        "userService",
        BeanDefinition::new::<UserService>(|r| {
            Ok(UserService { repo: resolve::<UserRepository>(r)?, logger: resolve::<Box<dyn Logger>>(r)? })
        })
        .scope(ScopeName::Prototype),
    )?;

    let container = builder.build()?;
    println!("container ready: {:?}", container.bean_definition_names());

    let config: Arc<Config> = container.get::<Config>()?;
    println!("config: database_url={}, debug={}", config.database_url, config.debug);

    let service = container.get_named::<UserService>("userService")?;
    println!("{}", service.get_user(42));

    // a fresh UserService each call, but riding the same singleton chain underneath
    let service2 = container.get_named::<UserService>("userService")?;
    println!("{}", service2.get_user(7));

    container.destroy_singletons();
    Ok(())
}
