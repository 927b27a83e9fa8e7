//! Symbol resolution
//!
//! The executor asks a [`SymbolResolver`] for every field and method it
//! touches. Resolution failure is fatal for the unit being decompiled.

use crate::bytecode::descriptor::{parse_type_descriptor, JvmType, MethodDescriptor};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Resolved member information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescription {
    /// Class that actually declares the member
    pub declaring_type: String,
    pub name: String,
    pub parameters: Vec<JvmType>,
    /// Field type, or method return type
    pub value_type: JvmType,
    pub is_static: bool,
}

/// Resolves members referenced by instructions
pub trait SymbolResolver: Send + Sync {
    fn resolve_method(&self, owner: &str, name: &str, descriptor: &str, is_static: bool)
        -> Result<MemberDescription>;

    fn resolve_field(&self, owner: &str, name: &str, descriptor: &str, is_static: bool)
        -> Result<MemberDescription>;

    /// Whether `type_name` implements the iteration protocol (`java/lang/Iterable`)
    fn is_iterable(&self, type_name: &str) -> bool {
        let _ = type_name;
        true
    }
}

fn unresolved(owner: &str, name: &str, descriptor: &str) -> Error {
    Error::SymbolResolution {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
}

/// Resolver that trusts the descriptor carried by the instruction
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorResolver;

impl SymbolResolver for DescriptorResolver {
    fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> Result<MemberDescription> {
        let parsed = MethodDescriptor::parse(descriptor).ok_or_else(|| unresolved(owner, name, descriptor))?;
        Ok(MemberDescription {
            declaring_type: owner.to_string(),
            name: name.to_string(),
            parameters: parsed.parameters,
            value_type: parsed.return_type,
            is_static,
        })
    }

    fn resolve_field(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_static: bool,
    ) -> Result<MemberDescription> {
        let value_type = parse_type_descriptor(descriptor).ok_or_else(|| unresolved(owner, name, descriptor))?;
        Ok(MemberDescription {
            declaring_type: owner.to_string(),
            name: name.to_string(),
            parameters: Vec::new(),
            value_type,
            is_static,
        })
    }
}

/// Explicit member registry. Unknown members fail resolution.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    members: HashMap<(String, String, String), MemberDescription>,
    iterables: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member; `declaring_type` may differ from `owner` for inherited members
    pub fn register(&mut self, owner: &str, name: &str, descriptor: &str, member: MemberDescription) {
        self.members
            .insert((owner.to_string(), name.to_string(), descriptor.to_string()), member);
    }

    /// Register a method from its descriptor, declared by `owner`
    pub fn register_method(&mut self, owner: &str, name: &str, descriptor: &str, is_static: bool) -> Result<()> {
        let member = DescriptorResolver.resolve_method(owner, name, descriptor, is_static)?;
        self.register(owner, name, descriptor, member);
        Ok(())
    }

    /// Register a field from its descriptor, declared by `owner`
    pub fn register_field(&mut self, owner: &str, name: &str, descriptor: &str, is_static: bool) -> Result<()> {
        let member = DescriptorResolver.resolve_field(owner, name, descriptor, is_static)?;
        self.register(owner, name, descriptor, member);
        Ok(())
    }

    pub fn register_iterable(&mut self, type_name: &str) {
        self.iterables.push(type_name.to_string());
    }

    fn lookup(&self, owner: &str, name: &str, descriptor: &str) -> Result<MemberDescription> {
        self.members
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
            .cloned()
            .ok_or_else(|| unresolved(owner, name, descriptor))
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve_method(&self, owner: &str, name: &str, descriptor: &str, _is_static: bool) -> Result<MemberDescription> {
        self.lookup(owner, name, descriptor)
    }

    fn resolve_field(&self, owner: &str, name: &str, descriptor: &str, _is_static: bool) -> Result<MemberDescription> {
        self.lookup(owner, name, descriptor)
    }

    fn is_iterable(&self, type_name: &str) -> bool {
        self.iterables.iter().any(|known| known == type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_resolver_reads_types() {
        let member = DescriptorResolver
            .resolve_method("java/util/List", "get", "(I)Ljava/lang/Object;", false)
            .unwrap();
        assert_eq!(member.parameters, vec![JvmType::Int]);
        assert_eq!(member.value_type, JvmType::Reference("java/lang/Object".into()));
        assert!(DescriptorResolver.resolve_field("A", "f", "Q", false).is_err());
    }

    #[test]
    fn symbol_table_fails_on_unknown_members() {
        let mut table = SymbolTable::new();
        table.register_field("A", "count", "I", false).unwrap();
        assert!(table.resolve_field("A", "count", "I", false).is_ok());
        match table.resolve_method("A", "missing", "()V", false) {
            Err(Error::SymbolResolution { name, .. }) => assert_eq!(name, "missing"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
