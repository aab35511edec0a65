use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    fstring::FString,
    save::SaveObject,
    structs::StructValue,
    tag::TagData,
    value::{ArrayValue, MapEntry, Properties, Property, PropertyValue, ValueVec},
    Result,
};

/// Location of a property or value inside a save: a root object index followed by steps.
///
/// The textual form is `[object:]step(.step)*` where a step is a property name with an
/// optional `#index` array index, or `@n` for the n-th property of a list, followed by any
/// number of `[n]` (array or set element), `{key}` (map entry by key) and `{@n}` (map entry
/// by position) suffixes.
///
/// ```
/// use gvas_tree::{PathStep, PropertyPath};
///
/// let path: PropertyPath = "1:Inventory[2].Count".parse()?;
/// assert_eq!(1, path.object);
/// assert_eq!(PathStep::Element(2), path.steps[1]);
/// assert_eq!("1:Inventory[2].Count", path.to_string());
/// # Ok::<(), gvas_tree::Error>(())
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPath {
    pub object: usize,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathStep {
    /// Property of a list by name and array index
    Property { name: String, index: u32 },
    /// Property of a list by position
    Position(usize),
    /// Element of an array or set
    Element(usize),
    /// Map entry by key
    Key(PropertyValue),
    /// Map entry by position
    Entry(usize),
}

impl PropertyPath {
    /// Path to the first root object.
    pub fn new() -> Self {
        Self::default()
    }
    pub fn object(object: usize) -> Self {
        Self {
            object,
            steps: vec![],
        }
    }
    pub fn property(self, name: impl Into<String>) -> Self {
        self.property_index(name, 0)
    }
    pub fn property_index(mut self, name: impl Into<String>, index: u32) -> Self {
        self.steps.push(PathStep::Property {
            name: name.into(),
            index,
        });
        self
    }
    pub fn position(mut self, position: usize) -> Self {
        self.steps.push(PathStep::Position(position));
        self
    }
    pub fn element(mut self, index: usize) -> Self {
        self.steps.push(PathStep::Element(index));
        self
    }
    pub fn key(mut self, key: PropertyValue) -> Self {
        self.steps.push(PathStep::Key(key));
        self
    }
    pub fn entry(mut self, index: usize) -> Self {
        self.steps.push(PathStep::Entry(index));
        self
    }
    /// Path without its last step.
    pub fn parent(&self) -> Option<(PropertyPath, &PathStep)> {
        let (last, rest) = self.steps.split_last()?;
        Some((
            PropertyPath {
                object: self.object,
                steps: rest.to_vec(),
            },
            last,
        ))
    }
    pub(crate) fn not_found(&self) -> Error {
        Error::PathNotFound(self.to_string())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.object != 0 {
            write!(f, "{}:", self.object)?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            let separator = if i == 0 { "" } else { "." };
            match step {
                PathStep::Property { name, index: 0 } => write!(f, "{separator}{name}")?,
                PathStep::Property { name, index } => write!(f, "{separator}{name}#{index}")?,
                PathStep::Position(n) => write!(f, "{separator}@{n}")?,
                PathStep::Element(n) => write!(f, "[{n}]")?,
                PathStep::Key(key) => match key.key_text() {
                    Some(text) => write!(f, "{{{text}}}")?,
                    None => f.write_str("{?}")?,
                },
                PathStep::Entry(n) => write!(f, "{{@{n}}}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for PropertyPath {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::InvalidData(format!("malformed property path {s:?}"));
        let number = |n: &str| n.parse::<usize>().map_err(|_| malformed());

        let (object, rest) = match s.split_once(':') {
            Some((object, rest))
                if !object.is_empty() && object.bytes().all(|b| b.is_ascii_digit()) =>
            {
                (number(object)?, rest)
            }
            _ => (0, s),
        };
        let mut path = PropertyPath::object(object);
        let mut chars = rest.char_indices().peekable();
        let mut expect_name = true;
        while let Some(&(start, c)) = chars.peek() {
            match c {
                '[' => {
                    chars.next();
                    let end = take_until(&mut chars, ']').ok_or_else(malformed)?;
                    path.steps.push(PathStep::Element(number(&rest[start + 1..end])?));
                    expect_name = false;
                }
                '{' => {
                    chars.next();
                    let end = take_until(&mut chars, '}').ok_or_else(malformed)?;
                    let key = &rest[start + 1..end];
                    match key.strip_prefix('@') {
                        Some(n) => path.steps.push(PathStep::Entry(number(n)?)),
                        None => path
                            .steps
                            .push(PathStep::Key(PropertyValue::Str(FString::new(key)))),
                    }
                    expect_name = false;
                }
                '.' if !expect_name => {
                    chars.next();
                    expect_name = true;
                }
                _ if expect_name => {
                    let mut end = rest.len();
                    while let Some(&(i, c)) = chars.peek() {
                        if matches!(c, '.' | '[' | '{') {
                            end = i;
                            break;
                        }
                        chars.next();
                    }
                    let segment = &rest[start..end];
                    if let Some(n) = segment.strip_prefix('@') {
                        path.steps.push(PathStep::Position(number(n)?));
                    } else {
                        let (name, index) = match segment.rsplit_once('#') {
                            Some((name, index)) => (name, number(index)?),
                            None => (segment, 0),
                        };
                        if name.is_empty() {
                            return Err(malformed());
                        }
                        let index = u32::try_from(index).map_err(|_| malformed())?;
                        path = path.property_index(name, index);
                    }
                    expect_name = false;
                }
                _ => return Err(malformed()),
            }
        }
        if expect_name && !rest.is_empty() {
            return Err(malformed());
        }
        Ok(path)
    }
}

/// Advance past the closing delimiter, returning its byte offset.
fn take_until(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    close: char,
) -> Option<usize> {
    chars.find(|&(_, c)| c == close).map(|(i, _)| i)
}

/// Read-only view of whatever a [`PropertyPath`] points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyView<'a> {
    Object(&'a SaveObject),
    Property(&'a Property),
    /// Array or set element, or map value
    Value(&'a PropertyValue),
    /// Element of a plain byte array
    Byte(u8),
}
impl<'a> PropertyView<'a> {
    /// Value of a property or element view.
    pub fn value(&self) -> Option<&'a PropertyValue> {
        match *self {
            PropertyView::Property(p) => Some(&p.value),
            PropertyView::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Property list nested in a value: a user defined struct or an embedded record.
pub(crate) fn nested_list(value: &PropertyValue) -> Option<&Properties> {
    match value {
        PropertyValue::Struct(StructValue::Struct(properties)) => Some(properties),
        PropertyValue::Array(ArrayValue {
            elements: ValueVec::Record(record),
            ..
        }) => Some(&record.properties),
        _ => None,
    }
}
pub(crate) fn nested_list_mut(value: &mut PropertyValue) -> Option<&mut Properties> {
    match value {
        PropertyValue::Struct(StructValue::Struct(properties)) => Some(properties),
        PropertyValue::Array(ArrayValue {
            elements: ValueVec::Record(record),
            ..
        }) => Some(&mut record.properties),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Node<'a> {
    List(&'a Properties),
    Property(&'a Property),
    Value(&'a PropertyValue),
    Byte(u8),
}
impl<'a> Node<'a> {
    fn list(self) -> Option<&'a Properties> {
        match self {
            Node::List(list) => Some(list),
            Node::Property(p) => nested_list(&p.value),
            Node::Value(v) => nested_list(v),
            Node::Byte(_) => None,
        }
    }
    fn value(self) -> Option<&'a PropertyValue> {
        match self {
            Node::Property(p) => Some(&p.value),
            Node::Value(v) => Some(v),
            _ => None,
        }
    }
    fn step(self, step: &PathStep) -> Option<Node<'a>> {
        Some(match step {
            PathStep::Property { name, index } => {
                let list = self.list()?;
                Node::Property(&list.0[list.position(name, *index)?])
            }
            PathStep::Position(n) => Node::Property(self.list()?.0.get(*n)?),
            PathStep::Element(n) => match self.value()? {
                PropertyValue::Array(array) => match &array.elements {
                    ValueVec::Values(values) => Node::Value(values.get(*n)?),
                    ValueVec::Bytes(bytes) => Node::Byte(*bytes.get(*n)?),
                    ValueVec::Record(_) => return None,
                },
                PropertyValue::Set(set) => Node::Value(set.elements.get(*n)?),
                _ => return None,
            },
            PathStep::Key(key) => match self.value()? {
                PropertyValue::Map(map) => {
                    Node::Value(&map.entries.iter().find(|e| e.key.matches_key(key))?.value)
                }
                _ => return None,
            },
            PathStep::Entry(n) => match self.value()? {
                PropertyValue::Map(map) => Node::Value(&map.entries.get(*n)?.value),
                _ => return None,
            },
        })
    }
}

pub(crate) fn view<'a>(objects: &'a [SaveObject], path: &PropertyPath) -> Result<PropertyView<'a>> {
    let object = objects.get(path.object).ok_or_else(|| path.not_found())?;
    let mut node = Node::List(&object.properties);
    for step in &path.steps {
        node = node.step(step).ok_or_else(|| path.not_found())?;
    }
    Ok(match node {
        Node::List(_) => PropertyView::Object(object),
        Node::Property(p) => PropertyView::Property(p),
        Node::Value(v) => PropertyView::Value(v),
        Node::Byte(b) => PropertyView::Byte(b),
    })
}

/// Mutable counterpart of the navigation above. Values carry the type their slot declares.
pub(crate) enum NodeMut<'a> {
    List(&'a mut Properties),
    Property(&'a mut Property),
    Value(&'a mut PropertyValue, TagData),
}
impl<'a> NodeMut<'a> {
    pub(crate) fn into_list(self) -> Option<&'a mut Properties> {
        match self {
            NodeMut::List(list) => Some(list),
            NodeMut::Property(p) => nested_list_mut(&mut p.value),
            NodeMut::Value(v, _) => nested_list_mut(v),
        }
    }
    pub(crate) fn into_value(self) -> Option<(&'a mut PropertyValue, TagData)> {
        match self {
            NodeMut::List(_) => None,
            NodeMut::Property(p) => Some((&mut p.value, p.tag.data.clone())),
            NodeMut::Value(v, data) => Some((v, data)),
        }
    }
    fn step(self, step: &PathStep) -> Option<NodeMut<'a>> {
        Some(match step {
            PathStep::Property { name, index } => {
                let list = self.into_list()?;
                let i = list.position(name, *index)?;
                NodeMut::Property(&mut list.0[i])
            }
            PathStep::Position(n) => NodeMut::Property(self.into_list()?.0.get_mut(*n)?),
            PathStep::Element(n) => match self.into_value()? {
                (PropertyValue::Array(array), TagData::Array(inner)) => {
                    let element_type = array.element_type(&inner).clone();
                    match &mut array.elements {
                        ValueVec::Values(values) => NodeMut::Value(values.get_mut(*n)?, element_type),
                        _ => return None,
                    }
                }
                (PropertyValue::Set(set), TagData::Set { key_type }) => {
                    NodeMut::Value(set.elements.get_mut(*n)?, *key_type)
                }
                _ => return None,
            },
            PathStep::Key(key) => match self.into_value()? {
                (PropertyValue::Map(map), TagData::Map { value_type, .. }) => {
                    let entry = map.entries.iter_mut().find(|e| e.key.matches_key(key))?;
                    NodeMut::Value(&mut entry.value, *value_type)
                }
                _ => return None,
            },
            PathStep::Entry(n) => match self.into_value()? {
                (PropertyValue::Map(map), TagData::Map { value_type, .. }) => {
                    let MapEntry { value, .. } = map.entries.get_mut(*n)?;
                    NodeMut::Value(value, *value_type)
                }
                _ => return None,
            },
        })
    }
}

pub(crate) fn walk_mut<'a>(object: &'a mut SaveObject, steps: &[PathStep]) -> Option<NodeMut<'a>> {
    let mut node = NodeMut::List(&mut object.properties);
    for step in steps {
        node = node.step(step)?;
    }
    Some(node)
}

/// Flag every property along `steps` as modified.
pub(crate) fn mark_dirty(object: &mut SaveObject, steps: &[PathStep]) {
    let mut node = NodeMut::List(&mut object.properties);
    for step in steps {
        node = match node.step(step) {
            Some(node) => node,
            None => return,
        };
        if let NodeMut::Property(p) = &mut node {
            p.dirty = true;
        }
    }
}
