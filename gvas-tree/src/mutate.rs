use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{
    error::Error,
    header::VersionInfo,
    save::SaveObject,
    tag::{PropertyTag, PropertyType, TagData},
    tree::{mark_dirty, walk_mut, NodeMut, PathStep, PropertyPath},
    value::{raw_byte_members, Byte, MapEntry, Properties, Property, PropertyValue, ValueVec},
    Result,
};

/// A single edit of the property tree. Every operation is checked in full before anything
/// is changed, so a failed operation leaves the tree untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationOp {
    /// Overwrite a property, element or map value with a value of the same type
    Replace {
        path: PropertyPath,
        value: PropertyValue,
    },
    /// Remove a property, an array or set element, or a map entry
    Delete { path: PropertyPath },
    /// Insert a scalar into the array or set at `path`
    InsertScalar {
        path: PropertyPath,
        index: usize,
        element_type: PropertyType,
        value: PropertyValue,
    },
    /// Insert a new scalar property into the property list at `path`
    InsertProperty {
        path: PropertyPath,
        index: usize,
        name: String,
        value: PropertyValue,
    },
    /// Insert an entry into the map at `path`
    InsertEntry {
        path: PropertyPath,
        index: usize,
        key: PropertyValue,
        value: PropertyValue,
    },
    /// Change the declared type of a property and reset its value.
    ///
    /// Nothing else in the tree is updated, so properties whose meaning depends on the
    /// retyped one may no longer agree with it.
    Retype { path: PropertyPath, data: TagData },
}
impl MutationOp {
    pub fn path(&self) -> &PropertyPath {
        match self {
            MutationOp::Replace { path, .. }
            | MutationOp::Delete { path }
            | MutationOp::InsertScalar { path, .. }
            | MutationOp::InsertProperty { path, .. }
            | MutationOp::InsertEntry { path, .. }
            | MutationOp::Retype { path, .. } => path,
        }
    }
}

fn unsupported(what: impl Into<String>) -> Error {
    Error::UnsupportedOperation(what.into())
}
fn record_edit() -> Error {
    unsupported("embedded records are edited through their properties")
}
fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(Error::IndexOutOfBounds { index, len });
    }
    Ok(())
}
fn check_insert_index(index: usize, len: usize) -> Result<()> {
    if index > len {
        return Err(Error::IndexOutOfBounds { index, len });
    }
    Ok(())
}
/// Byte value written into a plain byte array.
fn as_raw_byte(value: &PropertyValue) -> Result<u8> {
    match value {
        PropertyValue::Byte(Byte::Byte(b)) | PropertyValue::UInt8(b) => Ok(*b),
        other => Err(Error::mismatch("ByteProperty", other.type_name())),
    }
}

#[instrument(skip_all, fields(path = %op.path()))]
pub(crate) fn apply(
    objects: &mut [SaveObject],
    version: &dyn VersionInfo,
    op: &MutationOp,
) -> Result<()> {
    let path = op.path();
    let object = objects
        .get_mut(path.object)
        .ok_or_else(|| path.not_found())?;
    match op {
        MutationOp::Replace { path, value } => replace(object, path, value, version)?,
        MutationOp::Delete { path } => delete(object, path)?,
        MutationOp::InsertScalar {
            path,
            index,
            element_type,
            value,
        } => insert_scalar(object, path, *index, *element_type, value, version)?,
        MutationOp::InsertProperty {
            path,
            index,
            name,
            value,
        } => insert_property(object, path, *index, name, value)?,
        MutationOp::InsertEntry {
            path,
            index,
            key,
            value,
        } => insert_entry(object, path, *index, key, value, version)?,
        MutationOp::Retype { path, data } => retype(object, path, data, version)?,
    }
    let dirty = match op {
        MutationOp::Delete { path } => &path.steps[..path.steps.len().saturating_sub(1)],
        other => &other.path().steps[..],
    };
    mark_dirty(object, dirty);
    Ok(())
}

/// Parent node of the last step of `path`, and that step.
fn parent<'a, 'p>(
    object: &'a mut SaveObject,
    path: &'p PropertyPath,
) -> Result<(NodeMut<'a>, &'p PathStep)> {
    let (last, rest) = path
        .steps
        .split_last()
        .ok_or_else(|| unsupported("a root object cannot be replaced or deleted"))?;
    let node = walk_mut(object, rest).ok_or_else(|| path.not_found())?;
    Ok((node, last))
}

/// Position of the property a name or position step refers to.
fn property_in(list: &Properties, step: &PathStep, path: &PropertyPath) -> Result<usize> {
    match step {
        PathStep::Property { name, index } => {
            list.position(name, *index).ok_or_else(|| path.not_found())
        }
        PathStep::Position(n) => {
            check_index(*n, list.len())?;
            Ok(*n)
        }
        _ => Err(path.not_found()),
    }
}

/// Carry over what a replacement cannot change: whether a byte is raw or an enum label, and
/// the shared element tag of a legacy struct array.
fn keep_slot_shape(current: &PropertyValue, new: &mut PropertyValue) -> Result<()> {
    match (current, new) {
        (PropertyValue::Byte(old), PropertyValue::Byte(b)) if old.is_raw() != b.is_raw() => Err(
            Error::mismatch(Byte::kind(old.is_raw()), Byte::kind(b.is_raw())),
        ),
        (PropertyValue::Array(old), PropertyValue::Array(array)) => {
            if let Some(tag) = &old.inner_tag {
                if let Some(other) = &array.inner_tag {
                    if other.data != tag.data {
                        return Err(Error::mismatch(element_name(tag), element_name(other)));
                    }
                }
                array.inner_tag.get_or_insert_with(|| tag.clone());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
fn element_name(tag: &PropertyTag) -> &str {
    match &tag.data {
        TagData::Struct { struct_type, .. } => struct_type.as_str(),
        other => other.type_name(),
    }
}

fn replace(
    object: &mut SaveObject,
    path: &PropertyPath,
    value: &PropertyValue,
    version: &dyn VersionInfo,
) -> Result<()> {
    let (node, step) = parent(object, path)?;
    match step {
        PathStep::Property { .. } | PathStep::Position(_) => {
            let list = node.into_list().ok_or_else(|| path.not_found())?;
            let i = property_in(list, step, path)?;
            let property = &mut list.0[i];
            if property.value.is_opaque() {
                return Err(unsupported(format!(
                    "{} was not decoded and cannot be replaced",
                    property.tag.data.type_name()
                )));
            }
            let mut value = value.clone();
            keep_slot_shape(&property.value, &mut value)?;
            value.check(&property.tag.data, version)?;
            if let (PropertyValue::Bool(b), TagData::Bool(inline)) =
                (&value, &mut property.tag.data)
            {
                *inline = *b;
            }
            property.value = value;
        }
        PathStep::Element(n) => {
            let (container, data) = node.into_value().ok_or_else(|| path.not_found())?;
            match (container, &data) {
                (PropertyValue::Array(array), TagData::Array(inner)) => {
                    let element_type = array.element_type(inner).clone();
                    match &mut array.elements {
                        ValueVec::Bytes(bytes) => {
                            check_index(*n, bytes.len())?;
                            bytes[*n] = as_raw_byte(value)?;
                        }
                        ValueVec::Values(values) => {
                            check_index(*n, values.len())?;
                            value.check_member(&element_type, false, version)?;
                            values[*n] = value.clone();
                        }
                        ValueVec::Record(_) => return Err(record_edit()),
                    }
                }
                (PropertyValue::Set(set), TagData::Set { key_type }) => {
                    check_index(*n, set.elements.len())?;
                    value.check_member(key_type, raw_byte_members(key_type, version), version)?;
                    set.elements[*n] = value.clone();
                }
                _ => return Err(path.not_found()),
            }
        }
        PathStep::Key(_) | PathStep::Entry(_) => {
            let (container, data) = node.into_value().ok_or_else(|| path.not_found())?;
            let (PropertyValue::Map(map), TagData::Map { value_type, .. }) = (container, &data)
            else {
                return Err(path.not_found());
            };
            let i = map_entry(&map.entries, step, path)?;
            value.check_member(value_type, raw_byte_members(value_type, version), version)?;
            map.entries[i].value = value.clone();
        }
    }
    Ok(())
}

fn map_entry(entries: &[MapEntry], step: &PathStep, path: &PropertyPath) -> Result<usize> {
    match step {
        PathStep::Key(key) => entries
            .iter()
            .position(|e| e.key.matches_key(key))
            .ok_or_else(|| path.not_found()),
        PathStep::Entry(n) => {
            check_index(*n, entries.len())?;
            Ok(*n)
        }
        _ => Err(path.not_found()),
    }
}

fn delete(object: &mut SaveObject, path: &PropertyPath) -> Result<()> {
    let (node, step) = parent(object, path)?;
    match step {
        PathStep::Property { .. } | PathStep::Position(_) => {
            let list = node.into_list().ok_or_else(|| path.not_found())?;
            let i = property_in(list, step, path)?;
            list.0.remove(i);
        }
        PathStep::Element(n) => {
            let (container, _) = node.into_value().ok_or_else(|| path.not_found())?;
            match container {
                PropertyValue::Array(array) => match &mut array.elements {
                    ValueVec::Bytes(bytes) => {
                        check_index(*n, bytes.len())?;
                        bytes.remove(*n);
                    }
                    ValueVec::Values(values) => {
                        check_index(*n, values.len())?;
                        values.remove(*n);
                    }
                    ValueVec::Record(_) => return Err(record_edit()),
                },
                PropertyValue::Set(set) => {
                    check_index(*n, set.elements.len())?;
                    set.elements.remove(*n);
                }
                _ => return Err(path.not_found()),
            }
        }
        PathStep::Key(_) | PathStep::Entry(_) => {
            let (container, _) = node.into_value().ok_or_else(|| path.not_found())?;
            let PropertyValue::Map(map) = container else {
                return Err(path.not_found());
            };
            let i = map_entry(&map.entries, step, path)?;
            map.entries.remove(i);
        }
    }
    Ok(())
}

fn insert_scalar(
    object: &mut SaveObject,
    path: &PropertyPath,
    index: usize,
    element_type: PropertyType,
    value: &PropertyValue,
    version: &dyn VersionInfo,
) -> Result<()> {
    let node = walk_mut(object, &path.steps).ok_or_else(|| path.not_found())?;
    let (container, data) = node.into_value().ok_or_else(|| path.not_found())?;
    let check_type = |declared: &TagData, raw_byte: bool| -> Result<()> {
        if !declared.is_scalar() {
            return Err(unsupported(format!(
                "inserting {} elements",
                declared.type_name()
            )));
        }
        if declared.basic_type() != Some(element_type) {
            return Err(Error::mismatch(declared.type_name(), element_type.name()));
        }
        value.check_member(declared, raw_byte, version)
    };
    match (container, &data) {
        (PropertyValue::Array(array), TagData::Array(inner)) => {
            let declared = array.element_type(inner).clone();
            check_type(&declared, matches!(array.elements, ValueVec::Bytes(_)))?;
            match &mut array.elements {
                ValueVec::Bytes(bytes) => {
                    check_insert_index(index, bytes.len())?;
                    bytes.insert(index, as_raw_byte(value)?);
                }
                ValueVec::Values(values) => {
                    check_insert_index(index, values.len())?;
                    values.insert(index, value.clone());
                }
                ValueVec::Record(_) => return Err(record_edit()),
            }
        }
        (PropertyValue::Set(set), TagData::Set { key_type }) => {
            check_type(&**key_type, raw_byte_members(key_type, version))?;
            check_insert_index(index, set.elements.len())?;
            set.elements.insert(index, value.clone());
        }
        (PropertyValue::Opaque(_), _) => {
            return Err(unsupported("inserting into a value that was not decoded"))
        }
        (other, _) => {
            return Err(Error::mismatch(
                "ArrayProperty or SetProperty",
                other.type_name(),
            ))
        }
    }
    Ok(())
}

fn insert_property(
    object: &mut SaveObject,
    path: &PropertyPath,
    index: usize,
    name: &str,
    value: &PropertyValue,
) -> Result<()> {
    if name.is_empty() || name == "None" {
        return Err(unsupported(format!("a property cannot be named {name:?}")));
    }
    let node = walk_mut(object, &path.steps).ok_or_else(|| path.not_found())?;
    let list = node
        .into_list()
        .ok_or_else(|| unsupported(format!("{path} is not a property list")))?;
    let data = value
        .scalar_tag()
        .ok_or_else(|| unsupported(format!("creating a {} property", value.type_name())))?;
    check_insert_index(index, list.len())?;
    let mut property = Property::new(PropertyTag::new(name, data), value.clone());
    property.dirty = true;
    list.0.insert(index, property);
    Ok(())
}

fn insert_entry(
    object: &mut SaveObject,
    path: &PropertyPath,
    index: usize,
    key: &PropertyValue,
    value: &PropertyValue,
    version: &dyn VersionInfo,
) -> Result<()> {
    let node = walk_mut(object, &path.steps).ok_or_else(|| path.not_found())?;
    let (container, data) = node.into_value().ok_or_else(|| path.not_found())?;
    let (
        PropertyValue::Map(map),
        TagData::Map {
            key_type,
            value_type,
        },
    ) = (container, &data)
    else {
        return Err(path.not_found());
    };
    for declared in [key_type, value_type] {
        if !declared.is_scalar() {
            return Err(unsupported(format!(
                "inserting map entries of {}",
                declared.type_name()
            )));
        }
    }
    key.check_member(key_type, raw_byte_members(key_type, version), version)?;
    value.check_member(value_type, raw_byte_members(value_type, version), version)?;
    if map.entries.iter().any(|e| e.key.matches_key(key)) {
        return Err(unsupported("map already contains this key"));
    }
    check_insert_index(index, map.entries.len())?;
    map.entries.insert(
        index,
        MapEntry {
            key: key.clone(),
            value: value.clone(),
        },
    );
    Ok(())
}

fn retype(
    object: &mut SaveObject,
    path: &PropertyPath,
    data: &TagData,
    version: &dyn VersionInfo,
) -> Result<()> {
    let (node, step) = parent(object, path)?;
    if !matches!(step, PathStep::Property { .. } | PathStep::Position(_)) {
        return Err(unsupported("only properties can be retyped"));
    }
    let list = node.into_list().ok_or_else(|| path.not_found())?;
    let i = property_in(list, step, path)?;
    let property = &mut list.0[i];
    warn!(
        from = property.tag.data.type_name(),
        to = data.type_name(),
        "retyping property, dependent values are not updated"
    );
    property.tag.data = data.clone();
    property.tag.reset_flags();
    property.value = PropertyValue::default_for(data, version);
    Ok(())
}
