use byteorder::{WriteBytesExt, LE};
use pretty_assertions::assert_eq;

use crate::*;

const SAVE_CLASS: &str = "/Script/Game.MySaveGame";
const HAT_CLASS: &str = "/Game/Hats/Hat.Hat_C";
const MYSTERY: [u8; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];

fn fstr(s: &str) -> Vec<u8> {
    let mut out = vec![];
    if s.is_empty() {
        out.write_i32::<LE>(0).unwrap();
    } else if s.is_ascii() {
        out.write_i32::<LE>(s.len() as i32 + 1).unwrap();
        out.extend(s.as_bytes());
        out.push(0);
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        out.write_i32::<LE>(-(units.len() as i32 + 1)).unwrap();
        for u in units {
            out.write_u16::<LE>(u).unwrap();
        }
        out.write_u16::<LE>(0).unwrap();
    }
    out
}
fn u32le(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}
fn i32le(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}
fn f32le(v: f32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}
fn vec3(x: f32, y: f32, z: f32) -> Vec<u8> {
    [f32le(x), f32le(y), f32le(z)].concat()
}
fn struct_meta(name: &str) -> Vec<u8> {
    [fstr(name), vec![0; 16]].concat()
}
fn node(name: &str, inner: &[Vec<u8>]) -> Vec<u8> {
    [fstr(name), u32le(inner.len() as u32), inner.concat()].concat()
}
fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

/// Property list builder for fixtures.
#[derive(Default)]
struct Props(Vec<u8>);
impl Props {
    fn legacy(mut self, name: &str, type_name: &str, meta: &[u8], payload: &[u8]) -> Self {
        self.0.extend(fstr(name));
        self.0.extend(fstr(type_name));
        self.0.extend(u32le(payload.len() as u32));
        self.0.extend(u32le(0));
        self.0.extend(meta);
        self.0.push(0);
        self.0.extend(payload);
        self
    }
    fn complete(mut self, name: &str, node: &[u8], flags: u8, extra: &[u8], payload: &[u8]) -> Self {
        self.0.extend(fstr(name));
        self.0.extend(node);
        self.0.extend(u32le(payload.len() as u32));
        self.0.push(flags);
        self.0.extend(extra);
        self.0.extend(payload);
        self
    }
    fn none(mut self) -> Vec<u8> {
        self.0.extend(fstr("None"));
        self.0
    }
}

fn legacy_header() -> Vec<u8> {
    let mut out = b"GVAS".to_vec();
    out.extend(u32le(2));
    out.extend(u32le(522));
    for v in [4u16, 27, 2] {
        out.write_u16::<LE>(v).unwrap();
    }
    out.extend(u32le(0));
    out.extend(fstr("++UE4+Release-4.27"));
    out.extend(u32le(3));
    out.extend(u32le(1));
    out.extend(1..=16u8);
    out.extend(i32le(7));
    out
}

fn ue54_header() -> Vec<u8> {
    let mut out = b"GVAS".to_vec();
    out.extend(u32le(3));
    out.extend(u32le(522));
    out.extend(u32le(1012));
    for v in [5u16, 4, 0] {
        out.write_u16::<LE>(v).unwrap();
    }
    out.extend(u32le(0));
    out.extend(fstr("++UE5+Release-5.4"));
    out.extend(u32le(3));
    out.extend(u32le(0));
    out
}

fn legacy_save() -> Vec<u8> {
    let record = Props::default()
        .legacy("Health", "FloatProperty", &[], &f32le(100.0))
        .legacy("Level", "IntProperty", &[], &i32le(3))
        .none();
    let points = [
        u32le(2),
        fstr("Points"),
        fstr("StructProperty"),
        u32le(24),
        u32le(0),
        struct_meta("Vector"),
        vec![0],
        vec3(1.0, 2.0, 3.0),
        vec3(4.0, 5.0, 6.0),
    ]
    .concat();
    let stats = [
        u32le(1),
        fstr("W"),
        u32le(3),
        fstr("X"),
        i32le(1),
        fstr("Y"),
        i32le(2),
        fstr("Z"),
        i32le(3),
    ]
    .concat();
    let title = [u32le(0), vec![0xff], u32le(1), fstr("Hello")].concat();
    let label = [u32le(0), vec![3], vec![1, 2, 3, 4]].concat();
    let props = Props::default()
        .legacy("Score", "IntProperty", &[], &i32le(42))
        .legacy("Name", "StrProperty", &[], &fstr("Hinako"))
        .legacy("Motto", "StrProperty", &[], &fstr("héllo ✓"))
        .legacy("bAlive", "BoolProperty", &[1], &[])
        .legacy("HinakoRecord", "StructProperty", &struct_meta("HinakoRecord"), &record)
        .legacy("Position", "StructProperty", &struct_meta("Vector"), &vec3(7.0, 8.0, 9.0))
        .legacy("Items", "ArrayProperty", &fstr("IntProperty"), &[u32le(3), i32le(1), i32le(2), i32le(3)].concat())
        .legacy("Points", "ArrayProperty", &fstr("StructProperty"), &points)
        .legacy("Stats", "MapProperty", &[fstr("StrProperty"), fstr("IntProperty")].concat(), &stats)
        .legacy("Tags", "SetProperty", &fstr("NameProperty"), &[u32le(0), u32le(2), fstr("Red"), fstr("Blue")].concat())
        .legacy("Blob", "ArrayProperty", &fstr("ByteProperty"), &[u32le(4), vec![9, 8, 7, 6]].concat())
        .legacy("Title", "TextProperty", &[], &title)
        .legacy("Label", "TextProperty", &[], &label)
        .legacy("Mystery", "DelegateProperty", &[], &MYSTERY)
        .none();
    [legacy_header(), fstr(SAVE_CLASS), props, u32le(0)].concat()
}

fn ue54_save() -> Vec<u8> {
    let vector = node(
        "StructProperty",
        &[node("Vector", &[node("/Script/CoreUObject", &[])])],
    );
    let pos = [1.5f64, 2.5, 3.5]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect::<Vec<u8>>();
    let props = Props::default()
        .complete("Score", &node("IntProperty", &[]), 0, &[], &i32le(7))
        .complete("bOn", &node("BoolProperty", &[]), 0x10, &[], &[])
        .complete("Pos", &vector, 0x08, &[], &pos)
        .complete("Weird", &node("FancyProperty", &[]), 0, &[], &[9, 8, 7])
        .complete(
            "Arr",
            &node("ArrayProperty", &[node("IntProperty", &[])]),
            0,
            &[],
            &[u32le(2), i32le(10), i32le(20)].concat(),
        )
        .complete("Slot", &node("IntProperty", &[]), 0x01, &u32le(2), &i32le(99))
        .none();
    [ue54_header(), fstr(SAVE_CLASS), vec![0], props, u32le(0)].concat()
}

fn record_save(color: i32) -> Vec<u8> {
    let record = [
        vec![0],
        Props::default()
            .legacy("Color", "IntProperty", &[], &i32le(color))
            .none(),
        vec![0xaa, 0xbb, 0xcc, 0xdd],
    ]
    .concat();
    let props = Props::default()
        .legacy("Class", "ObjectProperty", &[], &fstr(HAT_CLASS))
        .legacy("Data", "ArrayProperty", &fstr("ByteProperty"), &[u32le(record.len() as u32), record].concat())
        .none();
    [legacy_header(), fstr(SAVE_CLASS), props, u32le(0)].concat()
}

fn path(s: &str) -> PropertyPath {
    s.parse().unwrap()
}
fn value_at<'a>(doc: &'a Document, p: &str) -> &'a PropertyValue {
    doc.property_at(&path(p)).unwrap().value().unwrap()
}
fn reload(doc: &Document) -> Document {
    Document::read(&doc.to_bytes().unwrap()).unwrap()
}
fn str_value(s: &str) -> PropertyValue {
    PropertyValue::Str(FString::new(s))
}

#[test]
fn legacy_round_trip() {
    let bytes = legacy_save();
    let doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    assert_eq!(bytes, reload(&doc).to_bytes().unwrap());

    let file = doc.save_file();
    assert_eq!(1, file.objects.len());
    assert_eq!(SAVE_CLASS, file.objects[0].name);
    assert!(file.end_marker);
    assert!(file.footer.is_empty());
    assert_eq!((4, 27), doc.header().engine());
    assert_eq!(&PropertyValue::Int(42), value_at(&doc, "Score"));
    assert_eq!(&PropertyValue::Bool(true), value_at(&doc, "bAlive"));
    assert_eq!(
        &PropertyValue::Float(100.0f32.into()),
        value_at(&doc, "HinakoRecord.Health")
    );
}

#[test]
fn complete_type_names_round_trip() {
    let bytes = ue54_save();
    let doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());

    let object = &doc.root_objects()[0];
    assert_eq!(Some(0), object.flags);
    let pos = &object.properties["Pos"];
    assert_eq!(
        TagData::Struct {
            struct_type: StructType::Vector,
            id: FGuid::nil(),
        },
        pos.tag.data
    );
    assert_eq!(
        PropertyValue::Struct(StructValue::Vector(Vector {
            x: 1.5f64.into(),
            y: 2.5f64.into(),
            z: 3.5f64.into(),
        })),
        pos.value
    );
    assert_eq!(&PropertyValue::Bool(true), value_at(&doc, "bOn"));
    assert_eq!(2, object.properties["Slot"].tag.index);
    assert_eq!(&PropertyValue::Int(99), value_at(&doc, "Slot#2"));
    assert_eq!(
        &PropertyValue::Array(ArrayValue {
            inner_tag: None,
            elements: ValueVec::Values(vec![PropertyValue::Int(10), PropertyValue::Int(20)]),
        }),
        value_at(&doc, "Arr")
    );
}

#[test]
fn unknown_types_are_carried_verbatim() {
    let doc = Document::read(&legacy_save()).unwrap();
    let mystery = &doc.root_objects()[0].properties["Mystery"];
    assert_eq!("DelegateProperty", mystery.tag.data.type_name());
    assert_eq!(PropertyValue::Opaque(MYSTERY.to_vec()), mystery.value);

    // known type with an undecoded text history
    assert!(value_at(&doc, "Label").is_opaque());
    assert_eq!(
        &PropertyValue::Text(Text {
            flags: 0,
            history: TextHistory::None {
                culture_invariant: vec![FString::new("Hello")],
            },
        }),
        value_at(&doc, "Title")
    );

    let doc = Document::read(&ue54_save()).unwrap();
    let weird = &doc.root_objects()[0].properties["Weird"];
    assert_eq!(
        TagData::Unknown(TypeNode {
            name: "FancyProperty".into(),
            inner: vec![],
        }),
        weird.tag.data
    );
    assert_eq!(PropertyValue::Opaque(vec![9, 8, 7]), weird.value);
}

#[test]
fn opaque_values_cannot_be_replaced() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    let err = doc
        .apply(MutationOp::Replace {
            path: path("Mystery"),
            value: PropertyValue::Opaque(vec![0; 9]),
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)), "{err}");
}

#[test]
fn array_delete_shrinks_count() {
    let bytes = legacy_save();
    let mut doc = Document::read(&bytes).unwrap();
    doc.apply(MutationOp::Delete {
        path: path("Items[1]"),
    })
    .unwrap();
    doc.apply(MutationOp::Delete {
        path: path("Blob[0]"),
    })
    .unwrap();
    let out = doc.to_bytes().unwrap();
    assert_eq!(bytes.len() - 5, out.len());

    let doc = Document::read(&out).unwrap();
    assert_eq!(
        &PropertyValue::Array(ArrayValue {
            inner_tag: None,
            elements: ValueVec::Values(vec![PropertyValue::Int(1), PropertyValue::Int(3)]),
        }),
        value_at(&doc, "Items")
    );
    assert_eq!(
        &PropertyValue::Array(ArrayValue {
            inner_tag: None,
            elements: ValueVec::Bytes(vec![8, 7, 6]),
        }),
        value_at(&doc, "Blob")
    );

    let mut doc = doc;
    let err = doc
        .apply(MutationOp::Delete {
            path: path("Items[5]"),
        })
        .unwrap_err();
    assert!(matches!(err, Error::IndexOutOfBounds { index: 5, len: 2 }), "{err}");
}

#[test]
fn scalar_insert_grows_count() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    doc.apply(MutationOp::InsertScalar {
        path: path("Items"),
        index: 3,
        element_type: PropertyType::IntProperty,
        value: PropertyValue::Int(4),
    })
    .unwrap();
    doc.apply(MutationOp::InsertScalar {
        path: path("Tags"),
        index: 0,
        element_type: PropertyType::NameProperty,
        value: PropertyValue::Name(FString::new("Green")),
    })
    .unwrap();

    let doc = reload(&doc);
    assert_eq!(&PropertyValue::Int(4), value_at(&doc, "Items[3]"));
    assert_eq!(
        &PropertyValue::Name(FString::new("Green")),
        value_at(&doc, "Tags[0]")
    );
    assert_eq!(
        &PropertyValue::Name(FString::new("Red")),
        value_at(&doc, "Tags[1]")
    );

    let mut doc = doc;
    let err = doc
        .apply(MutationOp::InsertScalar {
            path: path("Items"),
            index: 0,
            element_type: PropertyType::FloatProperty,
            value: PropertyValue::Float(1.0f32.into()),
        })
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }), "{err}");
    let err = doc
        .apply(MutationOp::InsertScalar {
            path: path("Items"),
            index: 9,
            element_type: PropertyType::IntProperty,
            value: PropertyValue::Int(0),
        })
        .unwrap_err();
    assert!(matches!(err, Error::IndexOutOfBounds { index: 9, len: 4 }), "{err}");
}

#[test]
fn struct_insert_is_rejected() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    let before = doc.clone();
    let err = doc
        .apply(MutationOp::InsertScalar {
            path: path("Points"),
            index: 0,
            element_type: PropertyType::StructProperty,
            value: PropertyValue::Struct(StructValue::Vector(Vector::default())),
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)), "{err}");
    assert_eq!(before, doc);
}

#[test]
fn struct_array_element_replace() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    let moved = PropertyValue::Struct(StructValue::Vector(Vector {
        x: 0.5f64.into(),
        y: 0.25f64.into(),
        z: 0.0f64.into(),
    }));
    doc.apply(MutationOp::Replace {
        path: path("Points[1]"),
        value: moved.clone(),
    })
    .unwrap();
    let doc = reload(&doc);
    assert_eq!(&moved, value_at(&doc, "Points[1]"));
}

#[test]
fn type_mismatch_leaves_tree_unchanged() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    let before = doc.clone();
    let err = doc
        .apply(MutationOp::Replace {
            path: path("Score"),
            value: str_value("many"),
        })
        .unwrap_err();
    assert!(
        matches!(
            &err,
            Error::TypeMismatch { expected, found }
                if expected == "IntProperty" && found == "StrProperty"
        ),
        "{err}"
    );
    let err = doc
        .apply(MutationOp::Replace {
            path: path("Position"),
            value: PropertyValue::Struct(StructValue::Rotator(Rotator::default())),
        })
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }), "{err}");
    assert_eq!(before, doc);
    assert!(!doc.is_modified());
}

#[test]
fn health_edit_changes_only_the_float() {
    let bytes = legacy_save();
    let mut doc = Document::read(&bytes).unwrap();
    doc.apply(MutationOp::Replace {
        path: path("HinakoRecord.Health"),
        value: PropertyValue::Float(50.0f32.into()),
    })
    .unwrap();
    assert!(doc.is_modified());
    let props = &doc.root_objects()[0].properties;
    assert!(props["HinakoRecord"].dirty);
    assert!(!props["Score"].dirty);

    let out = doc.to_bytes().unwrap();
    assert_eq!(bytes.len(), out.len());
    let at = find(&bytes, &fstr("Health")) + fstr("Health").len() + fstr("FloatProperty").len() + 9;
    assert_eq!(f32le(100.0).as_slice(), &bytes[at..at + 4]);
    assert_eq!(f32le(50.0).as_slice(), &out[at..at + 4]);
    let changed: Vec<usize> = (0..bytes.len()).filter(|&i| bytes[i] != out[i]).collect();
    assert!(!changed.is_empty());
    assert!(changed.iter().all(|i| (at..at + 4).contains(i)), "{changed:?}");
}

#[test]
fn map_delete_keeps_removed_keys() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    doc.apply(MutationOp::Delete {
        path: path("Stats{Y}"),
    })
    .unwrap();
    let doc = reload(&doc);
    let PropertyValue::Map(map) = value_at(&doc, "Stats") else {
        panic!("Stats is not a map");
    };
    assert_eq!(vec![str_value("W")], map.removed);
    assert_eq!(
        vec![str_value("X"), str_value("Z")],
        map.entries.iter().map(|e| e.key.clone()).collect::<Vec<_>>()
    );
    assert_eq!(&PropertyValue::Int(3), value_at(&doc, "Stats{Z}"));
    assert_eq!(&PropertyValue::Int(3), value_at(&doc, "Stats{@1}"));
}

#[test]
fn map_entry_insert() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    doc.apply(MutationOp::InsertEntry {
        path: path("Stats"),
        index: 3,
        key: str_value("Q"),
        value: PropertyValue::Int(9),
    })
    .unwrap();
    let err = doc
        .apply(MutationOp::InsertEntry {
            path: path("Stats"),
            index: 0,
            key: str_value("X"),
            value: PropertyValue::Int(0),
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)), "{err}");

    let doc = reload(&doc);
    assert_eq!(&PropertyValue::Int(9), value_at(&doc, "Stats{Q}"));
    assert_eq!(&PropertyValue::Int(9), value_at(&doc, "Stats{@3}"));
}

#[test]
fn utf16_strings_keep_negative_prefix() {
    let bytes = legacy_save();
    let doc = Document::read(&bytes).unwrap();
    let PropertyValue::Str(motto) = value_at(&doc, "Motto") else {
        panic!("Motto is not a string");
    };
    assert_eq!("héllo ✓", motto.as_str());
    assert!(motto.wide);
    assert!(find(&doc.to_bytes().unwrap(), &fstr("héllo ✓")) > 0);

    let mut doc = doc;
    doc.apply(MutationOp::Replace {
        path: path("Name"),
        value: str_value("日本"),
    })
    .unwrap();
    let out = doc.to_bytes().unwrap();
    let at = find(&out, &fstr("日本"));
    assert_eq!(-3, i32::from_le_bytes([out[at], out[at + 1], out[at + 2], out[at + 3]]));
    assert_eq!(&str_value("日本"), value_at(&reload(&doc), "Name"));
}

#[test]
fn bool_replace_updates_tag() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    doc.apply(MutationOp::Replace {
        path: path("bAlive"),
        value: PropertyValue::Bool(false),
    })
    .unwrap();
    let doc = reload(&doc);
    let alive = &doc.root_objects()[0].properties["bAlive"];
    assert_eq!(TagData::Bool(false), alive.tag.data);
    assert_eq!(PropertyValue::Bool(false), alive.value);

    let mut doc = Document::read(&ue54_save()).unwrap();
    doc.apply(MutationOp::Replace {
        path: path("bOn"),
        value: PropertyValue::Bool(false),
    })
    .unwrap();
    let doc = reload(&doc);
    let on = &doc.root_objects()[0].properties["bOn"];
    assert_eq!(0, on.tag.flags);
    assert_eq!(PropertyValue::Bool(false), on.value);
}

#[test]
fn truncated_input() {
    let bytes = legacy_save();
    let err = Document::read(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(matches!(err.error, Error::TruncatedData), "{err}");
    assert!(err.offset <= bytes.len() / 2);

    let err = Document::read(&bytes[..10]).unwrap_err();
    assert!(matches!(err.error, Error::TruncatedData), "{err}");
}

#[test]
fn declared_size_mismatch() {
    let header = [legacy_header(), fstr(SAVE_CLASS)].concat();
    let tag = [fstr("Score"), fstr("IntProperty"), u32le(8), u32le(0), vec![0]].concat();
    let bytes = [
        header.clone(),
        tag.clone(),
        i32le(5),
        i32le(6),
        fstr("None"),
        u32le(0),
    ]
    .concat();
    let err = Document::read(&bytes).unwrap_err();
    let offset = (header.len() + tag.len()) as u64;
    assert!(
        matches!(
            err.error,
            Error::SizeMismatch { offset: o, declared: 8, consumed: 4 } if o == offset
        ),
        "{err}"
    );
}

#[test]
fn retype_resets_value() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    doc.apply(MutationOp::Retype {
        path: path("Score"),
        data: TagData::Other(PropertyType::FloatProperty),
    })
    .unwrap();
    let doc = reload(&doc);
    let score = &doc.root_objects()[0].properties["Score"];
    assert_eq!(TagData::Other(PropertyType::FloatProperty), score.tag.data);
    assert_eq!(PropertyValue::Float(0.0f32.into()), score.value);

    let mut doc = doc;
    let err = doc
        .apply(MutationOp::Retype {
            path: path("Items[0]"),
            data: TagData::Other(PropertyType::FloatProperty),
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)), "{err}");
}

#[test]
fn insert_property() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    doc.apply(MutationOp::InsertProperty {
        path: path("HinakoRecord"),
        index: 2,
        name: "Mana".into(),
        value: PropertyValue::Float(7.5f32.into()),
    })
    .unwrap();
    doc.apply(MutationOp::InsertProperty {
        path: PropertyPath::new(),
        index: 0,
        name: "Gold".into(),
        value: PropertyValue::Int(500),
    })
    .unwrap();
    let err = doc
        .apply(MutationOp::InsertProperty {
            path: PropertyPath::new(),
            index: 0,
            name: "Spot".into(),
            value: PropertyValue::Struct(StructValue::Vector(Vector::default())),
        })
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)), "{err}");

    let doc = reload(&doc);
    let props = &doc.root_objects()[0].properties;
    assert_eq!("Gold", props.0[0].tag.name);
    assert_eq!(&PropertyValue::Float(7.5f32.into()), value_at(&doc, "HinakoRecord.Mana"));
    assert_eq!(&PropertyValue::Float(7.5f32.into()), value_at(&doc, "HinakoRecord.@2"));
}

#[test]
fn embedded_record() {
    let bytes = record_save(5);
    let mut types = Types::new();
    types.add_record_class(HAT_CLASS, 4);

    let plain = Document::read(&bytes).unwrap();
    assert!(matches!(
        value_at(&plain, "Data"),
        PropertyValue::Array(ArrayValue {
            elements: ValueVec::Bytes(_),
            ..
        })
    ));

    let mut doc = Document::read_with_types(&bytes, types.clone()).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    assert_eq!(&PropertyValue::Int(5), value_at(&doc, "Data.Color"));
    doc.apply(MutationOp::Replace {
        path: path("Data.Color"),
        value: PropertyValue::Int(9),
    })
    .unwrap();
    let out = doc.to_bytes().unwrap();
    assert_eq!(record_save(9), out);

    let doc = Document::read_with_types(&out, types).unwrap();
    let PropertyValue::Array(ArrayValue {
        elements: ValueVec::Record(record),
        ..
    }) = value_at(&doc, "Data")
    else {
        panic!("Data is not a record");
    };
    assert_eq!(vec![0xaa, 0xbb, 0xcc, 0xdd], record.trailer);
}

#[test]
fn record_with_wrong_trailer_stays_bytes() {
    let mut types = Types::new();
    types.add_record_class(HAT_CLASS, 8);
    let bytes = record_save(5);
    let doc = Document::read_with_types(&bytes, types).unwrap();
    assert!(matches!(
        value_at(&doc, "Data"),
        PropertyValue::Array(ArrayValue {
            elements: ValueVec::Bytes(_),
            ..
        })
    ));
    assert_eq!(bytes, doc.to_bytes().unwrap());
}

#[test]
fn struct_map_keys_use_type_hints() {
    let visits = [u32le(0), u32le(1), vec3(1.0, 2.0, 3.0), i32le(4)].concat();
    let props = Props::default()
        .legacy("Visits", "MapProperty", &[fstr("StructProperty"), fstr("IntProperty")].concat(), &visits)
        .none();
    let bytes = [legacy_header(), fstr(SAVE_CLASS), props, u32le(0)].concat();
    let mut types = Types::new();
    types.add("Visits.Key", StructType::Vector);

    let doc = Document::read_with_types(&bytes, types).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    let PropertyValue::Map(map) = value_at(&doc, "Visits") else {
        panic!("Visits is not a map");
    };
    assert!(matches!(
        map.entries[0].key,
        PropertyValue::Struct(StructValue::Vector(_))
    ));
    assert_eq!(&PropertyValue::Int(4), value_at(&doc, "Visits{@0}"));
}

#[test]
fn footer_is_preserved() {
    let bytes = [legacy_save(), vec![1, 2, 3]].concat();
    let doc = Document::read(&bytes).unwrap();
    assert_eq!(vec![1, 2, 3], doc.save_file().footer);
    assert_eq!(bytes, doc.to_bytes().unwrap());
}

#[test]
fn views_and_references() {
    let doc = Document::read(&legacy_save()).unwrap();
    assert!(matches!(
        doc.property_at(&PropertyPath::new()).unwrap(),
        PropertyView::Object(o) if o.name == SAVE_CLASS
    ));
    assert_eq!(
        PropertyView::Byte(7),
        doc.property_at(&path("Blob[2]")).unwrap()
    );
    assert!(matches!(
        doc.property_at(&path("Points[1]")).unwrap().value(),
        Some(PropertyValue::Struct(StructValue::Vector(_)))
    ));
    let err = doc.property_at(&path("Nope.Health")).unwrap_err();
    assert!(matches!(&err, Error::PathNotFound(p) if p == "Nope.Health"), "{err}");
    assert!(doc.property_at(&path("1:Score")).is_err());

    assert_eq!(Some(0), doc.resolve_reference(SAVE_CLASS));
    assert_eq!(Some(0), doc.resolve_reference("MySaveGame"));
    assert_eq!(None, doc.resolve_reference("/Game/Other.Thing"));
}

#[test]
fn path_syntax() {
    assert_eq!(
        PropertyPath::new().property("HinakoRecord").property("Health"),
        path("HinakoRecord.Health")
    );
    assert_eq!(PropertyPath::new().property("Inventory").element(2), path("Inventory[2]"));
    assert_eq!(
        PropertyPath::new().property("Flags").key(str_value("Key")),
        path("Flags{Key}")
    );
    assert_eq!(PropertyPath::new().property_index("Stat", 1), path("Stat#1"));
    assert_eq!(
        PropertyPath::object(1).property("Root").property("Prop"),
        path("1:Root.Prop")
    );
    assert_eq!(
        PropertyPath::new().position(3).property("Name").entry(0),
        path("@3.Name{@0}")
    );
    for s in ["HinakoRecord.Health", "Inventory[2].Count", "Flags{Key}", "Stat#1", "1:Root.Prop", "@3.Name{@0}"] {
        assert_eq!(s, path(s).to_string());
    }
    for s in ["A..B", "A[x]", "A.", "A[1", "#2"] {
        assert!(matches!(s.parse::<PropertyPath>(), Err(Error::InvalidData(_))), "{s}");
    }
}

#[test]
fn save_replaces_file_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("SaveSlot.sav");
    let bytes = legacy_save();
    std::fs::write(&target, &bytes).unwrap();

    let mut doc = Document::load(&target).unwrap();
    doc.apply(MutationOp::Replace {
        path: path("Score"),
        value: PropertyValue::Int(43),
    })
    .unwrap();
    doc.save(&target).unwrap();
    let saved = std::fs::read(&target).unwrap();
    assert_eq!(doc.to_bytes().unwrap(), saved);
    assert_eq!(&PropertyValue::Int(43), value_at(&Document::load(&target).unwrap(), "Score"));

    // a value that no longer matches its tag aborts the save
    let mut file = doc.into_save_file();
    file.objects[0].properties.0[0].value = str_value("x");
    let err = Document::from(file).save(&target).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }), "{err}");
    assert_eq!(saved, std::fs::read(&target).unwrap());
    assert_eq!(1, std::fs::read_dir(dir.path()).unwrap().count());
}

#[test]
fn json_round_trip() {
    let bytes = legacy_save();
    let doc = Document::read(&bytes).unwrap();
    let json = serde_json::to_string(doc.save_file()).unwrap();
    let file: SaveFile = serde_json::from_str(&json).unwrap();
    assert_eq!(bytes, file.to_bytes().unwrap());
}

#[test]
fn later_object_errors_fail_the_load() {
    let first = Props::default()
        .legacy("A", "IntProperty", &[], &i32le(1))
        .none();
    let second = Props::default()
        .legacy("B", "IntProperty", &[], &[i32le(2), vec![0]].concat())
        .none();
    let bytes = [legacy_header(), fstr("Obj1"), first, fstr("Obj2"), second, u32le(0)].concat();
    let err = Document::read(&bytes).unwrap_err();
    assert!(
        matches!(err.error, Error::SizeMismatch { declared: 5, consumed: 4, .. }),
        "{err}"
    );

    // a trailing word that cannot start another object is footer
    let mut bytes = legacy_save();
    bytes.truncate(bytes.len() - 4);
    bytes.extend(u32le(0xdead_beef));
    let doc = Document::read(&bytes).unwrap();
    assert_eq!(1, doc.root_objects().len());
    assert!(!doc.save_file().end_marker);
    assert_eq!(u32le(0xdead_beef), doc.save_file().footer);
    assert_eq!(bytes, doc.to_bytes().unwrap());
}

fn byte_save() -> Vec<u8> {
    let moods = [u32le(2), fstr("EMood::Happy"), fstr("EMood::Sad")].concat();
    let ranks = [u32le(0), u32le(1), fstr("ERank::Gold"), i32le(3)].concat();
    let props = Props::default()
        .legacy("Moods", "ArrayProperty", &fstr("ByteProperty"), &moods)
        .legacy("Ranks", "MapProperty", &[fstr("ByteProperty"), fstr("IntProperty")].concat(), &ranks)
        .legacy("Mood", "ByteProperty", &fstr("EMood"), &fstr("EMood::Sad"))
        .legacy("Blob", "ArrayProperty", &fstr("ByteProperty"), &[u32le(2), vec![9, 8]].concat())
        .none();
    [legacy_header(), fstr(SAVE_CLASS), props, u32le(0)].concat()
}
fn label(s: &str) -> PropertyValue {
    PropertyValue::Byte(Byte::Label(FString::new(s)))
}

#[test]
fn byte_slots_keep_their_representation() {
    let bytes = byte_save();
    let mut doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    let before = doc.clone();

    let raw = PropertyValue::Byte(Byte::Byte(1));
    let rejected = [
        MutationOp::InsertScalar {
            path: path("Moods"),
            index: 0,
            element_type: PropertyType::ByteProperty,
            value: raw.clone(),
        },
        MutationOp::Replace {
            path: path("Moods[1]"),
            value: raw.clone(),
        },
        MutationOp::InsertEntry {
            path: path("Ranks"),
            index: 0,
            key: raw.clone(),
            value: PropertyValue::Int(1),
        },
        MutationOp::Replace {
            path: path("Mood"),
            value: raw.clone(),
        },
        MutationOp::InsertScalar {
            path: path("Blob"),
            index: 0,
            element_type: PropertyType::ByteProperty,
            value: label("EMood::Happy"),
        },
    ];
    for op in rejected {
        let err = doc.apply(op.clone()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }), "{op:?}: {err}");
    }
    assert_eq!(before, doc);

    doc.apply(MutationOp::InsertScalar {
        path: path("Moods"),
        index: 2,
        element_type: PropertyType::ByteProperty,
        value: label("EMood::Calm"),
    })
    .unwrap();
    doc.apply(MutationOp::InsertEntry {
        path: path("Ranks"),
        index: 1,
        key: label("ERank::Iron"),
        value: PropertyValue::Int(0),
    })
    .unwrap();
    doc.apply(MutationOp::InsertScalar {
        path: path("Blob"),
        index: 2,
        element_type: PropertyType::ByteProperty,
        value: raw,
    })
    .unwrap();

    let doc = reload(&doc);
    assert_eq!(&label("EMood::Calm"), value_at(&doc, "Moods[2]"));
    assert_eq!(&PropertyValue::Int(0), value_at(&doc, "Ranks{@1}"));
    assert_eq!(PropertyView::Byte(1), doc.property_at(&path("Blob[2]")).unwrap());
}

#[test]
fn sentinel_names_cannot_be_inserted() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    let before = doc.clone();
    for name in ["None", ""] {
        let err = doc
            .apply(MutationOp::InsertProperty {
                path: PropertyPath::new(),
                index: 0,
                name: name.into(),
                value: PropertyValue::Int(5),
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)), "{name:?}: {err}");
    }
    assert_eq!(before, doc);

    let mut file = doc.into_save_file();
    file.objects[0].properties.0[0].tag.name = FString::new("None");
    let err = file.to_bytes().unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)), "{err}");
}

fn latin1(s: &[u8]) -> Vec<u8> {
    [i32le(s.len() as i32 + 1), s.to_vec(), vec![0]].concat()
}

#[test]
fn narrow_latin1_names_round_trip() {
    let cafe = [latin1(b"Caf\xe9"), fstr("IntProperty"), u32le(4), u32le(0), vec![0], i32le(1)].concat();
    let menu = Props::default()
        .legacy("Menu", "StructProperty", &[latin1(b"Men\xfc"), vec![0; 16]].concat(), &fstr("None"))
        .none();
    let bytes = [legacy_header(), latin1(b"/Game/Caf\xe9.Caf\xe9_C"), cafe, menu, u32le(0)].concat();

    let mut doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    let object = &doc.root_objects()[0];
    assert_eq!("/Game/Café.Café_C", object.name);
    assert!(!object.name.wide);
    let property = &object.properties.0[0];
    assert_eq!("Café", property.tag.name);
    assert!(!property.tag.name.wide);
    let TagData::Struct { struct_type, .. } = &object.properties["Menu"].tag.data else {
        panic!("Menu is not a struct");
    };
    assert_eq!("Menü", struct_type.as_str());

    doc.apply(MutationOp::Replace {
        path: path("Café"),
        value: PropertyValue::Int(2),
    })
    .unwrap();
    let out = doc.to_bytes().unwrap();
    assert_eq!(bytes.len(), out.len());
    assert_eq!(&PropertyValue::Int(2), value_at(&reload(&doc), "Café"));
}

#[test]
fn struct_array_replace_keeps_element_tag() {
    let mut doc = Document::read(&legacy_save()).unwrap();
    let element = PropertyValue::Struct(StructValue::Vector(Vector {
        x: 1.0f64.into(),
        y: 1.0f64.into(),
        z: 1.0f64.into(),
    }));
    doc.apply(MutationOp::Replace {
        path: path("Points"),
        value: PropertyValue::Array(ArrayValue {
            inner_tag: None,
            elements: ValueVec::Values(vec![element.clone()]),
        }),
    })
    .unwrap();

    let doc = reload(&doc);
    let PropertyValue::Array(points) = value_at(&doc, "Points") else {
        panic!("Points is not an array");
    };
    let inner = points.inner_tag.as_ref().unwrap();
    assert_eq!("Points", inner.name);
    assert!(matches!(
        inner.data,
        TagData::Struct {
            struct_type: StructType::Vector,
            ..
        }
    ));
    assert_eq!(ValueVec::Values(vec![element]), points.elements);

    let mut doc = doc;
    let before = doc.clone();
    let err = doc
        .apply(MutationOp::Replace {
            path: path("Points"),
            value: PropertyValue::Array(ArrayValue {
                inner_tag: Some(PropertyTag::new(
                    "Points",
                    TagData::Struct {
                        struct_type: StructType::Rotator,
                        id: FGuid::nil(),
                    },
                )),
                elements: ValueVec::Values(vec![PropertyValue::Struct(StructValue::Rotator(
                    Rotator::default(),
                ))]),
            }),
        })
        .unwrap_err();
    assert!(
        matches!(&err, Error::TypeMismatch { expected, found } if expected == "Vector" && found == "Rotator"),
        "{err}"
    );
    assert_eq!(before, doc);
}

#[test]
fn tag_extras_round_trip() {
    let props = Props::default()
        .legacy("bOdd", "BoolProperty", &[2], &[])
        .none();
    let bytes = [legacy_header(), fstr(SAVE_CLASS), props, u32le(0)].concat();
    let doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    assert_eq!(&PropertyValue::Bool(true), value_at(&doc, "bOdd"));
    assert_eq!(Some(2), doc.root_objects()[0].properties["bOdd"].tag.bool_byte);

    let ext = |extensions: &[u8]| {
        let props = Props::default()
            .complete("Ext", &node("IntProperty", &[]), 0x04, extensions, &i32le(5))
            .none();
        [ue54_header(), fstr(SAVE_CLASS), vec![0], props, u32le(0)].concat()
    };
    let bytes = ext(&[0x02, 1, 0]);
    let doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    let tag = &doc.root_objects()[0].properties["Ext"].tag;
    assert_eq!(vec![0x02, 1, 0], tag.extensions);
    assert_eq!(&PropertyValue::Int(5), value_at(&doc, "Ext"));

    let err = Document::read(&ext(&[0x01])).unwrap_err();
    assert!(matches!(err.error, Error::InvalidData(_)), "{err}");
}

#[test]
fn unhinted_struct_sets_fall_back_to_opaque() {
    let spots = [u32le(0), u32le(1), vec3(1.0, 2.0, 3.0)].concat();
    let props = Props::default()
        .legacy("Spots", "SetProperty", &fstr("StructProperty"), &spots)
        .legacy("Score", "IntProperty", &[], &i32le(42))
        .none();
    let bytes = [legacy_header(), fstr(SAVE_CLASS), props, u32le(0)].concat();

    let doc = Document::read(&bytes).unwrap();
    assert_eq!(bytes, doc.to_bytes().unwrap());
    assert_eq!(&PropertyValue::Opaque(spots), value_at(&doc, "Spots"));
    assert_eq!(&PropertyValue::Int(42), value_at(&doc, "Score"));

    let mut types = Types::new();
    types.add("Spots", StructType::Vector);
    let doc = Document::read_with_types(&bytes, types).unwrap();
    assert!(matches!(
        value_at(&doc, "Spots[0]"),
        PropertyValue::Struct(StructValue::Vector(_))
    ));
}
