//! Deterministic content digests over decoded attribute trees.
//!
//! The walk feeds tag, VR and value bytes of every element in tag order,
//! descending into sequence items depth first. Elements selected by the
//! `blank` predicate contribute their tag and VR with an empty value, so two
//! trees that differ only in those elements hash the same.

use dicom::core::header::Header;
use dicom::core::value::Value;
use dicom::core::Tag;
use dicom::object::InMemDicomObject;

pub fn hash_items(items: &[InMemDicomObject], blank: &dyn Fn(Tag) -> bool) -> String {
    let mut context = md5::Context::new();
    feed_items(&mut context, items, blank);
    format!("{:x}", context.compute())
}

/// Digest of a raw value payload, fragments concatenated in order.
pub fn hash_payload(value: &Value<InMemDicomObject, Vec<u8>>) -> String {
    let mut context = md5::Context::new();
    match value {
        Value::Primitive(primitive) => context.consume(primitive.to_bytes()),
        Value::PixelSequence(sequence) => {
            for fragment in sequence.fragments() {
                context.consume(fragment);
            }
        }
        Value::Sequence(sequence) => feed_items(&mut context, sequence.items(), &|_| false),
    }
    format!("{:x}", context.compute())
}

fn feed_items(context: &mut md5::Context, items: &[InMemDicomObject], blank: &dyn Fn(Tag) -> bool) {
    context.consume((items.len() as u32).to_le_bytes());
    for item in items {
        context.consume(b"ITEM");
        feed_object(context, item, blank);
    }
    context.consume(b"SEQEND");
}

fn feed_object(context: &mut md5::Context, object: &InMemDicomObject, blank: &dyn Fn(Tag) -> bool) {
    for element in object.iter() {
        let tag = element.tag();
        context.consume(tag.group().to_le_bytes());
        context.consume(tag.element().to_le_bytes());
        context.consume(element.vr().to_string().as_bytes());

        if blank(tag) {
            context.consume(0u32.to_le_bytes());
            continue;
        }

        match element.value() {
            Value::Primitive(primitive) => {
                let bytes = primitive.to_bytes();
                context.consume((bytes.len() as u32).to_le_bytes());
                context.consume(&bytes);
            }
            Value::Sequence(sequence) => feed_items(context, sequence.items(), blank),
            Value::PixelSequence(sequence) => {
                for fragment in sequence.fragments() {
                    context.consume((fragment.len() as u32).to_le_bytes());
                    context.consume(fragment);
                }
            }
        }
    }
}
