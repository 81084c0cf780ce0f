//! The namespace registry: dispatches custom-typed values to and from opaque bytes.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::codec::Codec;
use crate::error::Error;

type EncodeFn = dyn Fn(&Codec, &dyn Any) -> Result<Vec<u8>, Error>;
type DecodeFn = dyn Fn(&Codec, &[u8]) -> Result<Rc<dyn Any>, Error>;
type MatchPredicate = dyn Fn(&dyn Any) -> bool;

/// Whether a typed entry matches only its exact registered type, or any value a
/// caller-supplied predicate accepts (standing in for `isinstance` subtype checks).
pub enum MatchPolicy {
    ExactType,
    Subtype,
}

pub struct TypedEntry {
    pub(crate) type_id: u32,
    #[allow(dead_code)]
    type_name: &'static str,
    policy: MatchPolicy,
    exact_type: Option<TypeId>,
    predicate: Option<Box<MatchPredicate>>,
    encode: Box<EncodeFn>,
    decode: Box<DecodeFn>,
}

impl TypedEntry {
    fn matches(&self, value: &dyn Any) -> bool {
        match self.policy {
            MatchPolicy::ExactType => Some(value.type_id()) == self.exact_type,
            MatchPolicy::Subtype => (self
                .predicate
                .as_ref()
                .expect("subtype entry must carry a predicate"))(value),
        }
    }
}

/// A namespace that doesn't key on a fixed set of type ids: a single matcher gets
/// first refusal over every value, with an effective wire type_id of `0`.
pub trait CatchAllNamespace {
    fn matches(&self, value: &dyn Any) -> bool;
    fn encode(&self, codec: &Codec, value: &dyn Any) -> Result<Vec<u8>, Error>;
    fn decode(&self, codec: &Codec, data: &[u8]) -> Result<Rc<dyn Any>, Error>;
}

pub enum Namespace {
    Typed(Vec<TypedEntry>),
    CatchAll(Box<dyn CatchAllNamespace>),
}

/// Builder for a [`Namespace::Typed`], mirroring the distilled system's decorator
/// sugar (`@module.encoder(py_type=..., type_id=...)`) as chained method calls.
pub struct NamespaceModule {
    name: String,
    entries: Vec<TypedEntry>,
}

impl NamespaceModule {
    pub fn new(name: impl Into<String>) -> Self {
        NamespaceModule { name: name.into(), entries: Vec::new() }
    }

    /// Register an exact-type codec for `T` under `type_id`.
    pub fn register<T, E, D>(mut self, type_id: u32, encode: E, decode: D) -> Self
    where
        T: Any,
        E: Fn(&Codec, &T) -> Result<Vec<u8>, Error> + 'static,
        D: Fn(&Codec, &[u8]) -> Result<T, Error> + 'static,
    {
        self.entries.push(TypedEntry {
            type_id,
            type_name: std::any::type_name::<T>(),
            policy: MatchPolicy::ExactType,
            exact_type: Some(TypeId::of::<T>()),
            predicate: None,
            encode: Box::new(move |codec, any| {
                let value = any
                    .downcast_ref::<T>()
                    .expect("registry matched this entry by TypeId; downcast cannot fail");
                encode(codec, value)
            }),
            decode: Box::new(move |codec, data| {
                let value = decode(codec, data)?;
                Ok(Rc::new(value) as Rc<dyn Any>)
            }),
        });
        self
    }

    /// Register a subtype codec: `predicate` decides the match, `T` only names the
    /// decode output type.
    pub fn register_subtype<T, P, E, D>(mut self, type_id: u32, predicate: P, encode: E, decode: D) -> Self
    where
        T: Any,
        P: Fn(&dyn Any) -> bool + 'static,
        E: Fn(&Codec, &dyn Any) -> Result<Vec<u8>, Error> + 'static,
        D: Fn(&Codec, &[u8]) -> Result<T, Error> + 'static,
    {
        self.entries.push(TypedEntry {
            type_id,
            type_name: std::any::type_name::<T>(),
            policy: MatchPolicy::Subtype,
            exact_type: None,
            predicate: Some(Box::new(predicate)),
            encode: Box::new(encode),
            decode: Box::new(move |codec, data| {
                let value = decode(codec, data)?;
                Ok(Rc::new(value) as Rc<dyn Any>)
            }),
        });
        self
    }

    pub(crate) fn into_parts(self) -> (String, u64, Vec<TypedEntry>) {
        let fingerprint = module_fingerprint(&self.name, &self.entries);
        (self.name, fingerprint, self.entries)
    }
}

/// A content-derived identity for a built module: the name plus its set of type
/// ids. Two modules built by the same factory function (e.g. re-running a
/// `fn module() -> NamespaceModule` at each call site, as a singleton-style
/// plugin would) fingerprint identically, so re-registering one is idempotent
/// even though `NamespaceModule` itself isn't `Clone` and can't be compared by
/// identity.
fn module_fingerprint(name: &str, entries: &[TypedEntry]) -> u64 {
    let mut type_ids: Vec<u32> = entries.iter().map(|e| e.type_id).collect();
    type_ids.sort_unstable();
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    type_ids.hash(&mut hasher);
    hasher.finish()
}

struct RegisteredNamespace {
    namespace: Namespace,
    module_id: Option<u64>,
}

pub struct NamespaceRegistry {
    order: Vec<String>,
    table: HashMap<String, RegisteredNamespace>,
    fast_index: RefCell<HashMap<TypeId, (String, u32)>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        NamespaceRegistry { order: Vec::new(), table: HashMap::new(), fast_index: RefCell::new(HashMap::new()) }
    }

    fn validate_new(&self, name: &str, namespace: &Namespace) -> Result<(), Error> {
        if self.table.contains_key(name) {
            return Err(Error::DuplicateNamespace(name.to_string()));
        }
        if let Namespace::Typed(entries) = namespace {
            let mut seen = std::collections::HashSet::new();
            for entry in entries {
                if !seen.insert(entry.type_id) {
                    return Err(Error::DuplicateTypeId { namespace: name.to_string(), type_id: entry.type_id });
                }
            }
        }
        Ok(())
    }

    pub fn add_namespace(&mut self, name: impl Into<String>, namespace: Namespace) -> Result<(), Error> {
        let name = name.into();
        self.validate_new(&name, &namespace)?;
        self.order.push(name.clone());
        self.table.insert(name, RegisteredNamespace { namespace, module_id: None });
        Ok(())
    }

    /// Register a [`NamespaceModule`]. Re-registering a module with the same name
    /// and the same set of type ids (its content fingerprint, see
    /// [`module_fingerprint`]) is a no-op — this is what lets a singleton-style
    /// plugin factory be called and registered from more than one call site.
    /// Registering a different module under a name already in use is a
    /// [`Error::DuplicateNamespace`].
    pub fn add_module(&mut self, module: NamespaceModule) -> Result<(), Error> {
        let (name, module_id, entries) = module.into_parts();
        if let Some(existing) = self.table.get(&name) {
            return if existing.module_id == Some(module_id) {
                Ok(())
            } else {
                Err(Error::DuplicateNamespace(name))
            };
        }
        let namespace = Namespace::Typed(entries);
        self.validate_new(&name, &namespace)?;
        self.order.push(name.clone());
        self.table.insert(name, RegisteredNamespace { namespace, module_id: Some(module_id) });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.table.clear();
        self.fast_index.borrow_mut().clear();
    }

    pub(crate) fn encode(&self, codec: &Codec, value: &dyn Any) -> Result<(String, u32, Vec<u8>), Error> {
        let concrete = value.type_id();
        if let Some((ns, tid)) = self.fast_index.borrow().get(&concrete).cloned()
            && let Some(reg) = self.table.get(&ns)
            && let Namespace::Typed(entries) = &reg.namespace
            && let Some(entry) = entries.iter().find(|e| e.type_id == tid)
            && entry.matches(value)
        {
            let data = (entry.encode)(codec, value)?;
            return Ok((ns, tid, data));
        }

        for name in &self.order {
            let reg = &self.table[name];
            match &reg.namespace {
                Namespace::CatchAll(matcher) => {
                    if matcher.matches(value) {
                        let data = matcher.encode(codec, value)?;
                        return Ok((name.clone(), 0, data));
                    }
                }
                Namespace::Typed(entries) => {
                    for entry in entries {
                        if entry.matches(value) {
                            if matches!(entry.policy, MatchPolicy::ExactType) {
                                self.fast_index.borrow_mut().insert(concrete, (name.clone(), entry.type_id));
                            }
                            let data = (entry.encode)(codec, value)?;
                            return Ok((name.clone(), entry.type_id, data));
                        }
                    }
                }
            }
        }
        Err(Error::Unserializable)
    }

    pub(crate) fn decode(&self, codec: &Codec, namespace: &str, type_id: u32, data: &[u8]) -> Result<Rc<dyn Any>, Error> {
        let reg = self.table.get(namespace).ok_or_else(|| Error::UnknownNamespace(namespace.to_string()))?;
        match &reg.namespace {
            Namespace::CatchAll(matcher) => matcher.decode(codec, data),
            Namespace::Typed(entries) => {
                let entry = entries
                    .iter()
                    .find(|e| e.type_id == type_id)
                    .ok_or_else(|| Error::UnknownTypeId { namespace: namespace.to_string(), type_id })?;
                (entry.decode)(codec, data)
            }
        }
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Codec, Value};

    #[test]
    fn duplicate_namespace_rejected() {
        let mut codec = Codec::new();
        codec.add_namespace("ns", Namespace::Typed(Vec::new())).unwrap();
        let err = codec.add_namespace("ns", Namespace::Typed(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::DuplicateNamespace(name) if name == "ns"));
    }

    #[test]
    fn duplicate_type_id_rejected() {
        let module = NamespaceModule::new("dup")
            .register::<u32, _, _>(1, |_c, v: &u32| Ok(v.to_le_bytes().to_vec()), |_c, d| {
                Ok(u32::from_le_bytes(d.try_into().unwrap()))
            })
            .register::<String, _, _>(1, |_c, v: &String| Ok(v.clone().into_bytes()), |_c, d| {
                Ok(String::from_utf8(d.to_vec()).unwrap())
            });
        let mut codec = Codec::new();
        let err = codec.add_module(module).unwrap_err();
        assert!(matches!(err, Error::DuplicateTypeId { .. }));
    }

    #[test]
    fn conflicting_plain_namespace_is_rejected_not_merged() {
        let module = NamespaceModule::new("ns").register::<u32, _, _>(
            1,
            |_c, v: &u32| Ok(v.to_le_bytes().to_vec()),
            |_c, d| Ok(u32::from_le_bytes(d.try_into().unwrap())),
        );
        let mut codec = Codec::new();
        codec.add_namespace("ns", Namespace::Typed(Vec::new())).unwrap();
        assert!(codec.add_module(module).is_err());
    }

    // A plugin namespace built by a factory function, the way
    // `original_source/py/src/tobytes/table.py`'s module-level `table_namespace`
    // singleton gets imported and registered from more than one call site.
    fn build_counter_module() -> NamespaceModule {
        NamespaceModule::new("factory").register::<u32, _, _>(
            1,
            |_c, v: &u32| Ok(v.to_le_bytes().to_vec()),
            |_c, d| Ok(u32::from_le_bytes(d.try_into().unwrap())),
        )
    }

    #[test]
    fn readding_a_content_identical_module_is_idempotent() {
        let mut codec = Codec::new();
        codec.add_module(build_counter_module()).unwrap();
        // A second, freshly-built module with the same name and type ids --
        // not the same object, since `NamespaceModule` isn't `Clone` -- must
        // still be accepted without requiring `clear_namespaces` first.
        codec.add_module(build_counter_module()).unwrap();

        let bytes = codec.dumps(&Value::custom(7u32)).unwrap();
        let decoded = codec.loads(&bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<u32>(), Some(&7u32));
    }

    struct Bob {
        name: String,
    }

    struct Bill {
        name: String,
    }

    fn person_name(value: &dyn Any) -> Option<&str> {
        if let Some(bob) = value.downcast_ref::<Bob>() {
            return Some(&bob.name);
        }
        if let Some(bill) = value.downcast_ref::<Bill>() {
            return Some(&bill.name);
        }
        None
    }

    #[test]
    fn subtype_entries_match_every_type_the_predicate_accepts() {
        let module = NamespaceModule::new("people").register_subtype::<Bob, _, _, _>(
            1,
            |value| value.is::<Bob>() || value.is::<Bill>(),
            |_codec, value| Ok(person_name(value).unwrap().as_bytes().to_vec()),
            |_codec, data| Ok(Bob { name: String::from_utf8(data.to_vec()).unwrap() }),
        );
        let mut codec = Codec::new();
        codec.add_module(module).unwrap();

        let bob_bytes = codec.dumps(&Value::custom(Bob { name: "Alice".into() })).unwrap();
        let bill_bytes = codec.dumps(&Value::custom(Bill { name: "Riley".into() })).unwrap();

        let bob_decoded = codec.loads(&bob_bytes).unwrap();
        let bill_decoded = codec.loads(&bill_bytes).unwrap();
        assert_eq!(bob_decoded.downcast_ref::<Bob>().unwrap().name, "Alice");
        assert_eq!(bill_decoded.downcast_ref::<Bob>().unwrap().name, "Riley");
    }
}
