//! Stringified NBT rendering.
//!
//! Primitives carry the suffixes `b`, `s`, `i`, `L`, `f`, `d`; arrays render
//! as `[B;…]`, `[I;…]`, `[L;…]`; strings are double-quoted with inner quotes
//! escaped. A named tag is prefixed `name:`.

use std::fmt::Write as _;

use crate::{NbtCompound, NbtList, NbtValue};

/// Renders a named tag as `name:<value>`, or just the value when unnamed.
#[must_use]
pub fn named(name: &str, value: &NbtValue) -> String {
    if name.is_empty() {
        self::value(value)
    } else {
        format!("{name}:{}", self::value(value))
    }
}

/// Renders an unnamed value.
#[must_use]
pub fn value(value: &NbtValue) -> String {
    match value {
        NbtValue::End => String::new(),
        NbtValue::Byte(v) => format!("{v}b"),
        NbtValue::Short(v) => format!("{v}s"),
        NbtValue::Int(v) => format!("{v}i"),
        NbtValue::Long(v) => format!("{v}L"),
        NbtValue::Float(v) => format!("{v:?}f"),
        NbtValue::Double(v) => format!("{v:?}d"),
        NbtValue::ByteArray(v) => array("B", v.iter().map(|b| format!("{b}b"))),
        NbtValue::String(v) => quoted(v),
        NbtValue::List(list) => self::list(list),
        NbtValue::Compound(compound) => self::compound(compound),
        NbtValue::IntArray(v) => array("I", v.iter().map(ToString::to_string)),
        NbtValue::LongArray(v) => array("L", v.iter().map(|l| format!("{l}L"))),
    }
}

#[must_use]
pub fn compound(compound: &NbtCompound) -> String {
    let mut out = String::from("{");
    for (i, (name, child)) in compound.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", named(name, child));
    }
    out.push('}');
    out
}

#[must_use]
pub fn list(list: &NbtList) -> String {
    let elements: Vec<String> = match list {
        NbtList::Empty => Vec::new(),
        NbtList::Byte(v) => v.iter().map(|b| format!("{b}b")).collect(),
        NbtList::Short(v) => v.iter().map(|s| format!("{s}s")).collect(),
        NbtList::Int(v) => v.iter().map(|i| format!("{i}i")).collect(),
        NbtList::Long(v) => v.iter().map(|l| format!("{l}L")).collect(),
        NbtList::Float(v) => v.iter().map(|f| format!("{f:?}f")).collect(),
        NbtList::Double(v) => v.iter().map(|d| format!("{d:?}d")).collect(),
        NbtList::ByteArray(v) => v
            .iter()
            .map(|arr| array("B", arr.iter().map(|b| format!("{b}b"))))
            .collect(),
        NbtList::String(v) => v.iter().map(|s| quoted(s)).collect(),
        NbtList::List(v) => v.iter().map(self::list).collect(),
        NbtList::Compound(v) => v.iter().map(self::compound).collect(),
        NbtList::IntArray(v) => v
            .iter()
            .map(|arr| array("I", arr.iter().map(ToString::to_string)))
            .collect(),
        NbtList::LongArray(v) => v
            .iter()
            .map(|arr| array("L", arr.iter().map(|l| format!("{l}L"))))
            .collect(),
    };
    format!("[{}]", elements.join(","))
}

fn array(prefix: &str, elements: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = elements.collect();
    format!("[{prefix};{}]", items.join(","))
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use crate::{NamedTag, NbtList, NbtValue, nbt};

    #[test]
    fn compound_with_byte_and_string() {
        let tag = NamedTag::new(
            "root",
            nbt! {
                "x" => 1i8,
                "s" => "hi",
            },
        );
        assert_eq!(tag.to_snbt(), "root:{x:1b,s:\"hi\"}");
    }

    #[test]
    fn primitive_suffixes() {
        assert_eq!(NbtValue::Byte(1).to_snbt(), "1b");
        assert_eq!(NbtValue::Short(2).to_snbt(), "2s");
        assert_eq!(NbtValue::Int(3).to_snbt(), "3i");
        assert_eq!(NbtValue::Long(4).to_snbt(), "4L");
        assert_eq!(NbtValue::Float(1.25).to_snbt(), "1.25f");
        assert_eq!(NbtValue::Double(1.5).to_snbt(), "1.5d");
    }

    #[test]
    fn arrays() {
        assert_eq!(NbtValue::ByteArray(vec![1, -2]).to_snbt(), "[B;1b,-2b]");
        assert_eq!(NbtValue::IntArray(vec![1, 2]).to_snbt(), "[I;1,2]");
        assert_eq!(NbtValue::LongArray(vec![3]).to_snbt(), "[L;3L]");
    }

    #[test]
    fn string_escaping() {
        let tag = NamedTag::new("s", "hello \"mc\"");
        assert_eq!(tag.to_snbt(), "s:\"hello \\\"mc\\\"\"");
    }

    #[test]
    fn named_list() {
        let tag = NamedTag::new("nums", NbtList::Byte(vec![1, 2]));
        assert_eq!(tag.to_snbt(), "nums:[1b,2b]");
    }

    #[test]
    fn empty_list_and_compound() {
        assert_eq!(NbtValue::List(NbtList::Empty).to_snbt(), "[]");
        assert_eq!(NbtValue::Compound(nbt! {}).to_snbt(), "{}");
    }
}
