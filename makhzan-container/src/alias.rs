//! Alias registry — alternative names for a canonical bean name.
//!
//! An alias is a pure `String -> String` mapping. Looking a bean up by an
//! alias is equivalent to looking it up by its canonical name; aliases may
//! even chain (an alias of an alias), but never cycle.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{MakhzanError, Result};

/// Narrow interface the alias registry consumes to rewrite both sides of
/// an alias mapping (e.g. after property-placeholder resolution). Left
/// deliberately minimal per spec's framing of expression/placeholder
/// resolution as an external collaborator.
pub trait StringValueResolver {
    fn resolve(&self, value: &str) -> Option<String>;
}

/// Maps alias -> target name, rejecting cycles and (unless overriding is
/// allowed) collisions with an existing canonical/alias entry.
#[derive(Default)]
pub struct AliasRegistry {
    aliases: RwLock<HashMap<String, String>>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `alias` to resolve to `canonical`.
    ///
    /// Fails if `alias` already maps to a *different* target and
    /// overriding is disabled, or if the new mapping would create a cycle
    /// (alias -> ... -> alias).
    pub fn register_alias(&self, canonical: &str, alias: &str, allow_override: bool) -> Result<()> {
        if alias == canonical {
            // registering an alias identical to its target is a no-op, not an error
            debug!(alias, canonical, "Alias equals canonical name, ignoring");
            return Ok(());
        }

        let mut map = self.aliases.write();

        if let Some(existing) = map.get(alias) {
            if existing == canonical {
                return Ok(()); // idempotent re-registration
            }
            if !allow_override {
                return Err(MakhzanError::bean_definition_store(
                    alias,
                    format!("alias already points to '{existing}', cannot retarget to '{canonical}'"),
                ));
            }
        }

        // Walk from `canonical` forward through existing aliases; if we ever
        // land back on `alias`, registering alias->canonical would close a
        // cycle.
        let mut cursor = canonical.to_string();
        let mut seen = std::collections::HashSet::new();
        while let Some(next) = map.get(&cursor) {
            if !seen.insert(cursor.clone()) {
                break; // already-cyclic data defensively bounded, shouldn't happen
            }
            if next == alias {
                return Err(MakhzanError::bean_definition_store(
                    alias,
                    format!("registering alias '{alias}' -> '{canonical}' would create a cycle"),
                ));
            }
            cursor = next.clone();
        }

        debug!(alias, canonical, "Registered alias");
        map.insert(alias.to_string(), canonical.to_string());
        Ok(())
    }

    /// Follows the alias chain to its fixed point.
    pub fn canonical_name(&self, name: &str) -> String {
        let map = self.aliases.read();
        let mut current = name.to_string();
        let mut hops = 0;
        while let Some(next) = map.get(&current) {
            current = next.clone();
            hops += 1;
            if hops > map.len() + 1 {
                // Defensive: a cycle should be unreachable given the guard in
                // register_alias, but never loop forever.
                warn!(name, "Alias chain did not terminate, breaking defensively");
                break;
            }
        }
        current
    }

    /// All aliases currently registered for `canonical` (direct only).
    pub fn aliases_for(&self, canonical: &str) -> Vec<String> {
        self.aliases
            .read()
            .iter()
            .filter(|(_, target)| target.as_str() == canonical)
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.read().contains_key(name)
    }

    /// Rewrites every alias and target through `resolver`. If resolution
    /// produces a collision between two aliases, the entry processed last
    /// wins and a warning is emitted (documented non-determinism, per
    /// spec's `resolveAliases`).
    pub fn resolve_aliases(&self, resolver: &dyn StringValueResolver) {
        let mut map = self.aliases.write();
        let entries: Vec<(String, String)> = map.drain().collect();
        for (alias, target) in entries {
            let resolved_alias = resolver.resolve(&alias).unwrap_or(alias.clone());
            let resolved_target = resolver.resolve(&target).unwrap_or(target.clone());

            if resolved_alias == resolved_target {
                continue; // resolves to a self-alias, drop it
            }

            if let Some(previous) = map.insert(resolved_alias.clone(), resolved_target.clone()) {
                if previous != resolved_target {
                    warn!(
                        alias = resolved_alias,
                        previous, resolved_target, "Alias collision after resolution, last write wins"
                    );
                }
            }
        }
    }
}
