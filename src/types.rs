//! Type references and the base-type catalog views are checked against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A possibly generic type name: `Base<Model, System.String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<TypeRef>,
}

impl TypeRef {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parses type text. Returns `None` for unbalanced brackets or empty names.
    pub fn parse(text: &str) -> Option<TypeRef> {
        let mut parser = TypeParser {
            chars: text.chars().collect(),
            pos: 0,
        };
        let parsed = parser.type_ref()?;
        parser.skip_space();
        if parser.pos == parser.chars.len() {
            Some(parsed)
        } else {
            None
        }
    }

    /// Replaces parameter names with the matching arguments.
    fn substitute(&self, bindings: &BTreeMap<String, TypeRef>) -> TypeRef {
        if self.args.is_empty() {
            if let Some(bound) = bindings.get(&self.name) {
                return bound.clone();
            }
        }
        TypeRef {
            name: self.name.clone(),
            args: self.args.iter().map(|a| a.substitute(bindings)).collect(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", arg)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

struct TypeParser {
    chars: Vec<char>,
    pos: usize,
}

impl TypeParser {
    fn skip_space(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn type_ref(&mut self) -> Option<TypeRef> {
        self.skip_space();
        let start = self.pos;
        while self.pos < self.chars.len()
            && (self.chars[self.pos].is_alphanumeric() || matches!(self.chars[self.pos], '_' | '.'))
        {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        self.skip_space();
        let mut args = Vec::new();
        if self.chars.get(self.pos) == Some(&'<') {
            self.pos += 1;
            loop {
                args.push(self.type_ref()?);
                self.skip_space();
                match self.chars.get(self.pos) {
                    Some(',') => self.pos += 1,
                    Some('>') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return None,
                }
            }
        }
        Some(TypeRef { name, args })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CATALOG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseTypeDef {
    pub name: String,
    /// Generic parameter names, in order.
    #[serde(default)]
    pub params: Vec<String>,
    /// Parent, expressed in terms of `params`.
    #[serde(default)]
    pub parent: Option<TypeRef>,
}

/// Known view base types. Keyed by name and arity, so `ViewBase` and
/// `ViewBase<TModel>` are distinct entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTypeCatalog {
    types: Vec<BaseTypeDef>,
}

impl Default for BaseTypeCatalog {
    fn default() -> Self {
        let mut catalog = Self { types: Vec::new() };
        catalog.register(BaseTypeDef {
            name: "ViewBase".to_string(),
            params: Vec::new(),
            parent: None,
        });
        catalog.register(BaseTypeDef {
            name: "ViewBase".to_string(),
            params: vec!["TModel".to_string()],
            parent: Some(TypeRef::simple("ViewBase")),
        });
        catalog
    }
}

impl BaseTypeCatalog {
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// Adds or replaces the definition with the same name and arity.
    pub fn register(&mut self, def: BaseTypeDef) {
        self.types
            .retain(|t| !(t.name == def.name && t.params.len() == def.params.len()));
        self.types.push(def);
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Option<&BaseTypeDef> {
        self.types
            .iter()
            .find(|t| t.name == name && t.params.len() == arity)
    }

    pub fn contains(&self, ty: &TypeRef) -> bool {
        self.lookup(&ty.name, ty.args.len()).is_some()
    }

    /// The closed ancestry of `ty`, starting with `ty` itself.
    pub fn ancestry(&self, ty: &TypeRef) -> Vec<TypeRef> {
        let mut chain = vec![ty.clone()];
        let mut current = ty.clone();
        while let Some(def) = self.lookup(&current.name, current.args.len()) {
            let Some(parent) = &def.parent else {
                break;
            };
            let bindings: BTreeMap<String, TypeRef> = def
                .params
                .iter()
                .cloned()
                .zip(current.args.iter().cloned())
                .collect();
            let closed = parent.substitute(&bindings);
            if chain.contains(&closed) {
                break;
            }
            chain.push(closed.clone());
            current = closed;
        }
        chain
    }

    pub fn is_instance_of(&self, ty: &TypeRef, candidate: &TypeRef) -> bool {
        self.ancestry(ty).iter().any(|t| t == candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_generics() {
        let ty = TypeRef::parse("Site.Views.Base< Model.Order , List<System.String>>").unwrap();
        assert_eq!(ty.name, "Site.Views.Base");
        assert_eq!(ty.args.len(), 2);
        assert_eq!(ty.to_string(), "Site.Views.Base<Model.Order, List<System.String>>");
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(TypeRef::parse("Base<A").is_none());
        assert!(TypeRef::parse("").is_none());
        assert!(TypeRef::parse("A B").is_none());
    }

    #[test]
    fn test_generic_ancestry_is_closed() {
        let mut catalog = BaseTypeCatalog::default();
        catalog.register(BaseTypeDef {
            name: "StoreView".to_string(),
            params: vec!["T".to_string()],
            parent: Some(TypeRef::generic("ViewBase", vec![TypeRef::simple("T")])),
        });
        let ty = TypeRef::parse("StoreView<Order>").unwrap();
        assert!(catalog.is_instance_of(&ty, &TypeRef::parse("ViewBase<Order>").unwrap()));
        assert!(catalog.is_instance_of(&ty, &TypeRef::simple("ViewBase")));
        assert!(!catalog.is_instance_of(&ty, &TypeRef::parse("ViewBase<Customer>").unwrap()));
    }
}
