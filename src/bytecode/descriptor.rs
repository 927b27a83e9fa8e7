//! Type and method descriptors
//!
//! Parses JVM field and method descriptors into [`JvmType`] values.

use serde::{Deserialize, Serialize};

/// A JVM type as named by a descriptor or inferred from an instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    /// Class or interface by internal name (`java/lang/String`)
    Reference(String),
    Array(Box<JvmType>),
    Null,
    Unknown,
}

impl JvmType {
    /// Two-slot types (long, double)
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    /// Types an `int` slot can carry on the operand stack
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean
        )
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null | JvmType::Unknown
        )
    }

    pub fn is_reference_to(&self, internal_name: &str) -> bool {
        matches!(self, JvmType::Reference(name) if name == internal_name)
    }

    /// Element type of an array type
    pub fn element(&self) -> Option<&JvmType> {
        match self {
            JvmType::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
            JvmType::Null | JvmType::Unknown => "Ljava/lang/Object;".into(),
        }
    }

    /// Source-level name (`java.lang.String`, `int[]`)
    pub fn source_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => internal_to_source_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.source_name()),
            JvmType::Null => "null".into(),
            JvmType::Unknown => "var".into(),
        }
    }

    /// Unqualified name (`String`, `int[]`)
    pub fn simple_name(&self) -> String {
        match self {
            JvmType::Reference(name) => simple_class_name(name).replace('$', "."),
            JvmType::Array(inner) => format!("{}[]", inner.simple_name()),
            other => other.source_name(),
        }
    }

    /// Type named by an internal class name or an array descriptor, as used by
    /// `anewarray`, `checkcast` and `instanceof`
    pub fn from_internal_name(name: &str) -> JvmType {
        if name.starts_with('[') {
            parse_type_descriptor(name).unwrap_or(JvmType::Unknown)
        } else {
            JvmType::Reference(name.to_string())
        }
    }
}

/// Parse a single type descriptor starting at `pos`; returns the type and the next position.
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    let ty = match *bytes.get(pos)? {
        b'B' => JvmType::Byte,
        b'C' => JvmType::Char,
        b'D' => JvmType::Double,
        b'F' => JvmType::Float,
        b'I' => JvmType::Int,
        b'J' => JvmType::Long,
        b'S' => JvmType::Short,
        b'Z' => JvmType::Boolean,
        b'V' => JvmType::Void,
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let name = &desc[pos + 1..pos + 1 + semi];
            return Some((JvmType::Reference(name.to_string()), pos + semi + 2));
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            return Some((JvmType::Array(Box::new(inner)), next));
        }
        _ => return None,
    };
    Some((ty, pos + 1))
}

/// Parse a complete field descriptor
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    match parse_type_at(desc, 0)? {
        (ty, end) if end == desc.len() => Some(ty),
        _ => None,
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<JvmType>,
    pub return_type: JvmType,
}

impl MethodDescriptor {
    /// Parse `(II)V` style descriptors
    pub fn parse(desc: &str) -> Option<Self> {
        let rest = desc.strip_prefix('(')?;
        let close = rest.find(')')? + 1;
        let mut parameters = Vec::new();
        let mut pos = 1;
        while pos < close {
            let (ty, next) = parse_type_at(desc, pos)?;
            parameters.push(ty);
            pos = next;
        }
        let (return_type, end) = parse_type_at(desc, close + 1)?;
        if end != desc.len() {
            return None;
        }
        Some(Self {
            parameters,
            return_type,
        })
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == JvmType::Void
    }
}

/// `java/lang/String` to `java.lang.String`
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// `java/util/Map$Entry` to `Map$Entry`
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Element type of a `newarray` type code
pub fn newarray_type(code: i32) -> JvmType {
    match code {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        10 => JvmType::Int,
        11 => JvmType::Long,
        _ => JvmType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_arrays_and_references() {
        assert_eq!(
            parse_type_descriptor("[[Ljava/lang/Object;"),
            Some(JvmType::Array(Box::new(JvmType::Array(Box::new(
                JvmType::Reference("java/lang/Object".into())
            )))))
        );
        assert_eq!(parse_type_descriptor("Ljava/lang/String;x"), None);
    }

    #[test]
    fn parses_method_descriptors() {
        let parsed = MethodDescriptor::parse("(JLjava/lang/String;[I)Z").unwrap();
        assert_eq!(
            parsed.parameters,
            vec![
                JvmType::Long,
                JvmType::Reference("java/lang/String".into()),
                JvmType::Array(Box::new(JvmType::Int)),
            ]
        );
        assert_eq!(parsed.return_type, JvmType::Boolean);
        assert!(MethodDescriptor::parse("()V").unwrap().returns_void());
        assert!(MethodDescriptor::parse("(I").is_none());
    }

    #[test]
    fn names_render_for_source() {
        assert_eq!(JvmType::Reference("java/util/Map$Entry".into()).simple_name(), "Map.Entry");
        assert_eq!(JvmType::Array(Box::new(JvmType::Int)).source_name(), "int[]");
        assert_eq!(
            JvmType::from_internal_name("[Ljava/lang/String;"),
            JvmType::Array(Box::new(JvmType::Reference("java/lang/String".into())))
        );
    }
}
