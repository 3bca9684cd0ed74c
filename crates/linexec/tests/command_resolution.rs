use linexec::command::layout_signature;
use linexec::{
    resolve_desc, ArrayKind, BufferItem, ComputationDesc, Directory, EngineError, ResolvedOp,
};

fn directory() -> Directory {
    let mut directory = Directory::new();
    directory
        .insert("M", BufferItem::new(ArrayKind::Matrix, 0, vec![3, 4]))
        .expect("insert M");
    directory
        .insert("V", BufferItem::new(ArrayKind::Vector, 12, vec![4]))
        .expect("insert V");
    directory
        .insert("A", BufferItem::new(ArrayKind::Vector, 16, vec![3]))
        .expect("insert A");
    directory
        .insert("B", BufferItem::new(ArrayKind::Vector, 19, vec![3]))
        .expect("insert B");
    directory
}

#[test]
fn json_description_resolves_in_order() {
    let desc: ComputationDesc = serde_json::from_str(
        r#"{ "steps": ["A = multiply M V", "B = add A B", "B = multiply B -1"] }"#,
    )
    .expect("valid description");
    let commands = resolve_desc(&directory(), &desc).expect("resolve");
    let texts: Vec<&str> = commands.iter().map(|command| command.text.as_str()).collect();
    assert_eq!(texts, desc.iter().collect::<Vec<_>>());
    assert!(matches!(
        commands[2].op,
        ResolvedOp::ScaleVector { factor, .. } if factor == -1.0
    ));
    assert_eq!(
        commands.iter().map(|c| c.op.work_size()).collect::<Vec<_>>(),
        vec![3, 3, 3]
    );
}

#[test]
fn layout_signature_serializes_referenced_entries() {
    let desc = ComputationDesc::parse("A = add A B");
    let commands = resolve_desc(&directory(), &desc).expect("resolve");
    let json = serde_json::to_value(layout_signature(&commands)).expect("serialize");
    assert_eq!(json["entries"]["A"]["offset"], 16);
    assert_eq!(json["entries"]["B"]["kind"], "Vector");
    assert!(json["entries"].get("M").is_none());
}

#[test]
fn directory_round_trips_through_json() {
    let original = directory();
    let text = serde_json::to_string(&original).expect("serialize");
    let restored: Directory = serde_json::from_str(&text).expect("deserialize");
    assert_eq!(restored, original);
    assert_eq!(restored.names().collect::<Vec<_>>(), vec!["A", "B", "M", "V"]);
}

#[test]
fn chained_description_fails_on_first_bad_command() {
    let mut desc = ComputationDesc::parse("A = multiply M V");
    desc.chain(&ComputationDesc::parse("A = multiply V M\nA = add A Z"));
    let err = resolve_desc(&directory(), &desc).expect_err("second command is invalid");
    assert!(matches!(
        err,
        EngineError::UnsupportedOperation { ref function, .. } if function == "multiply"
    ));
}
