use gvas_tree::{Document, MutationOp, PropertyPath, PropertyValue};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (Some(save), Some(health)) = (args.next(), args.next()) else {
        eprintln!("usage: edit-health <save> <health> [property path]");
        std::process::exit(2);
    };
    let path: PropertyPath = args
        .next()
        .as_deref()
        .unwrap_or("HinakoRecord.Health")
        .parse()?;
    let health: f32 = health.parse()?;

    let mut doc = Document::load(&save)?;
    if let Some(PropertyValue::Float(old)) = doc.property_at(&path)?.value() {
        println!("{path}: {} -> {health}", f32::from(*old));
    }
    doc.apply(MutationOp::Replace {
        path,
        value: PropertyValue::Float(health.into()),
    })?;
    doc.save(&save)?;
    Ok(())
}
