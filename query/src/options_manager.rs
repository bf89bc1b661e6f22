use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use crate::QueryOptions;

/// How a new set of options relates to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OptionsChange {
    /// Nothing that affects caching changed.
    Unchanged,
    /// Same key, but fetching behaviour changed.
    Updated,
    /// The observer moved to another key.
    KeyChanged {
        previous_key: String,
        previous_gc_time: Option<Duration>,
    },
}

/// Tracks the caching relevant part of an observer's options.
///
/// Custom query functions, schemas, `select` and placeholders are not hashed; closures have no
/// stable identity, and recreating one must not look like a configuration change.
#[derive(Debug)]
pub(crate) struct OptionsManager {
    hash: u64,
}

impl OptionsManager {
    pub(crate) fn new(options: &QueryOptions) -> Self {
        Self {
            hash: options_hash(options),
        }
    }

    /// Records `next` and classifies the change from `previous`.
    pub(crate) fn update(&mut self, previous: &QueryOptions, next: &QueryOptions) -> OptionsChange {
        let hash = options_hash(next);
        if hash == self.hash {
            return OptionsChange::Unchanged;
        }
        self.hash = hash;

        let previous_key = previous.cache_key();
        if previous_key == next.cache_key() {
            OptionsChange::Updated
        } else {
            OptionsChange::KeyChanged {
                previous_key,
                previous_gc_time: previous.gc_time,
            }
        }
    }
}

fn options_hash(options: &QueryOptions) -> u64 {
    let mut hasher = DefaultHasher::new();
    options.cache_key().hash(&mut hasher);
    options.source.url().hash(&mut hasher);
    options
        .params
        .as_ref()
        .map(ToString::to_string)
        .hash(&mut hasher);
    options.is_enabled().hash(&mut hasher);
    options.stale_time.hash(&mut hasher);
    options.gc_time.hash(&mut hasher);
    options.refetch_interval.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{query_key, Value};
    use serde_json::json;

    fn base() -> QueryOptions {
        QueryOptions::url(query_key!["user", 1], "/users/1")
    }

    #[test]
    fn recreated_closures_are_unchanged() {
        let previous = QueryOptions::query_fn("a", |_, _| async { Ok(Value::from(1)) });
        let next = QueryOptions::query_fn("a", |_, _| async { Ok(Value::from(2)) })
            .set_select(|data| Ok(data.clone()));
        let mut manager = OptionsManager::new(&previous);
        assert_eq!(manager.update(&previous, &next), OptionsChange::Unchanged);
    }

    #[test]
    fn timing_and_enabled_changes_are_updates() {
        let previous = base();
        let mut manager = OptionsManager::new(&previous);

        let next = base().set_stale_time(Some(Duration::ZERO));
        assert_eq!(manager.update(&previous, &next), OptionsChange::Updated);

        let previous = next;
        let next = previous.clone().set_enabled(false);
        assert_eq!(manager.update(&previous, &next), OptionsChange::Updated);
    }

    #[test]
    fn params_are_compared_by_value() {
        let previous = base().set_params(Some(Value::from(json!({"page": 1}))));
        let mut manager = OptionsManager::new(&previous);
        let same = base().set_params(Some(Value::from(json!({"page": 1}))));
        assert_eq!(manager.update(&previous, &same), OptionsChange::Unchanged);
        let other = base().set_params(Some(Value::from(json!({"page": 2}))));
        assert_eq!(manager.update(&previous, &other), OptionsChange::Updated);
    }

    #[test]
    fn key_changes_carry_previous_gc_time() {
        let previous = base().set_gc_time(Some(Duration::from_secs(30)));
        let mut manager = OptionsManager::new(&previous);
        let next = QueryOptions::url(query_key!["user", 2], "/users/2");
        assert_eq!(
            manager.update(&previous, &next),
            OptionsChange::KeyChanged {
                previous_key: r#"["user",1]"#.to_string(),
                previous_gc_time: Some(Duration::from_secs(30)),
            }
        );
    }
}
