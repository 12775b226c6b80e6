//! Case-insensitive property records

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use wmi_lite_provider::{NativeInstance, ProviderError, Variant};

/// One query result instance
///
/// Property names are enumerated when the bag is created; values are fetched
/// from the native instance on first lookup and memoized. Lookups ignore
/// letter case, and each property is fetched at most once regardless of the
/// case used to ask for it.
///
/// The memo is not synchronized: a bag is `Send` but not `Sync`.
pub struct PropertyBag {
    instance: Box<dyn NativeInstance>,
    names: Vec<String>,
    /// Lower-cased name to slot in `names`/`values`
    index: HashMap<String, usize>,
    values: Vec<OnceCell<Variant>>,
}

impl PropertyBag {
    /// Wrap a native instance
    #[must_use]
    pub fn new(instance: Box<dyn NativeInstance>) -> Self {
        let names = instance.property_names();

        let mut index = HashMap::with_capacity(names.len());
        for (slot, name) in names.iter().enumerate() {
            // first spelling wins when names differ only by case
            index.entry(name.to_lowercase()).or_insert(slot);
        }

        let values = names.iter().map(|_| OnceCell::new()).collect();

        Self {
            instance,
            names,
            index,
            values,
        }
    }

    /// Look up a property, ignoring letter case
    ///
    /// Returns `Ok(None)` when the instance has no such property.
    ///
    /// # Errors
    /// Returns the provider failure if the value cannot be fetched.
    pub fn get(&self, name: &str) -> Result<Option<&Variant>, ProviderError> {
        let Some(&slot) = self.index.get(&name.to_lowercase()) else {
            return Ok(None);
        };

        let cell = &self.values[slot];
        if let Some(value) = cell.get() {
            return Ok(Some(value));
        }

        let value = self.instance.property(&self.names[slot])?;
        Ok(Some(cell.get_or_init(|| value)))
    }

    /// Check whether the instance exposes a property, ignoring letter case
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Property names in schema order, as the provider spells them
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of properties
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the instance has no properties
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fetch every property, keyed by the provider's spelling
    ///
    /// # Errors
    /// Returns the first provider failure encountered.
    pub fn to_map(&self) -> Result<BTreeMap<String, Variant>, ProviderError> {
        let mut map = BTreeMap::new();
        for (slot, name) in self.names.iter().enumerate() {
            if self.index.get(&name.to_lowercase()) != Some(&slot) {
                continue;
            }
            if let Some(value) = self.get(name)? {
                map.insert(name.clone(), value.clone());
            }
        }
        Ok(map)
    }

    /// The wrapped native instance, for identity and debugging
    #[must_use]
    pub fn native(&self) -> &dyn NativeInstance {
        self.instance.as_ref()
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBag")
            .field("class", &self.instance.class_name())
            .field("properties", &self.names)
            .field(
                "fetched",
                &self.values.iter().filter(|v| v.get().is_some()).count(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug)]
    struct CountingInstance {
        properties: Vec<(&'static str, Variant)>,
        fetches: Arc<AtomicUsize>,
    }

    impl NativeInstance for CountingInstance {
        fn property_names(&self) -> Vec<String> {
            self.properties.iter().map(|(n, _)| (*n).to_string()).collect()
        }

        fn property(&self, name: &str) -> Result<Variant, ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.properties
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ProviderError::new(format!("no property {name}")))
        }
    }

    fn bag(properties: Vec<(&'static str, Variant)>) -> (PropertyBag, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let instance = CountingInstance {
            properties,
            fetches: Arc::clone(&fetches),
        };
        (PropertyBag::new(Box::new(instance)), fetches)
    }

    #[test]
    fn test_construction_fetches_nothing() {
        let (bag, fetches) = bag(vec![("Caption", "mycomputer1".into())]);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.property_names().collect::<Vec<_>>(), vec!["Caption"]);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lookup_ignores_case() {
        let (bag, _) = bag(vec![("Caption", "mycomputer1".into())]);
        let mixed = bag.get("Caption").unwrap();
        let lower = bag.get("caption").unwrap();
        assert_eq!(mixed, Some(&Variant::from("mycomputer1")));
        assert_eq!(mixed, lower);
        assert!(bag.contains("CAPTION"));
    }

    #[test]
    fn test_single_fetch_per_property() {
        let (bag, fetches) = bag(vec![
            ("Caption", "mycomputer1".into()),
            ("Cores", 4.into()),
        ]);
        for name in ["Caption", "caption", "CAPTION", "cAPTION"] {
            bag.get(name).unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        bag.get("cores").unwrap();
        bag.get("Cores").unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_property_is_absent_not_error() {
        let (bag, fetches) = bag(vec![("Caption", Variant::Null)]);
        assert_eq!(bag.get("bios").unwrap(), None);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        // present but empty is distinct from absent
        assert_eq!(bag.get("caption").unwrap(), Some(&Variant::Null));
    }

    #[test]
    fn test_fetch_failure_propagates() {
        #[derive(Debug)]
        struct Broken;

        impl NativeInstance for Broken {
            fn property_names(&self) -> Vec<String> {
                vec!["Name".to_string()]
            }

            fn property(&self, _name: &str) -> Result<Variant, ProviderError> {
                Err(ProviderError::new("access denied"))
            }
        }

        let bag = PropertyBag::new(Box::new(Broken));
        assert_eq!(bag.get("name").unwrap_err().message(), "access denied");
        assert!(bag.to_map().is_err());
    }

    #[test]
    fn test_to_map_uses_memo() {
        let (bag, fetches) = bag(vec![("cores", 2.into()), ("name", "mycomputer2".into())]);
        bag.get("NAME").unwrap();
        let map = bag.to_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["cores"], Variant::Int(2));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_spelling_first_wins() {
        let (bag, _) = bag(vec![("Name", "first".into()), ("NAME", "second".into())]);
        assert_eq!(bag.get("name").unwrap(), Some(&Variant::from("first")));
        assert_eq!(bag.to_map().unwrap().len(), 1);
    }
}
