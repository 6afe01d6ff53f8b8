use crate::command::{CollectionOp, CommandError, FindOptions, MongoCommand, parse_command};
use bson::{doc, oid::ObjectId};
use pretty_assertions::assert_eq;

fn collection_op(text: &str) -> (String, CollectionOp) {
    match parse_command(text).unwrap() {
        MongoCommand::Collection { collection, op } => (collection, op),
        other => panic!("expected a collection call, got {:?}", other),
    }
}

#[test]
fn test_command_document() {
    let cmd = parse_command(r#"  { "listCollections": 1, "nameOnly": true } ;"#).unwrap();
    assert_eq!(
        cmd,
        MongoCommand::RunCommand(doc! { "listCollections": 1, "nameOnly": true })
    );
}

#[test]
fn test_find_with_modifiers() {
    let (collection, op) = collection_op(
        r#"db.orders.find({"status": "open"}, {"total": 1}).sort({"created": -1}).skip(10).limit(5)"#,
    );
    assert_eq!(collection, "orders");
    assert_eq!(
        op,
        CollectionOp::Find {
            filter: doc! { "status": "open" },
            options: FindOptions {
                projection: Some(doc! { "total": 1 }),
                sort: Some(doc! { "created": -1 }),
                limit: Some(5),
                skip: Some(10),
            },
        }
    );
}

#[test]
fn test_find_without_arguments() {
    let (_, op) = collection_op("db.users.find()");
    assert_eq!(
        op,
        CollectionOp::Find {
            filter: doc! {},
            options: FindOptions::default(),
        }
    );
}

#[test]
fn test_dotted_collection_and_get_collection() {
    let (collection, op) = collection_op("db.system.profile.countDocuments()");
    assert_eq!(collection, "system.profile");
    assert_eq!(op, CollectionOp::CountDocuments { filter: doc! {} });

    let (collection, op) = collection_op(r#"db.getCollection('order items').estimatedDocumentCount()"#);
    assert_eq!(collection, "order items");
    assert_eq!(op, CollectionOp::EstimatedDocumentCount);
}

#[test]
fn test_extended_json_arguments() {
    let (_, op) = collection_op(
        r#"db.orders.findOne({"_id": {"$oid": "65a1b2c3d4e5f60718293a4b"}})"#,
    );
    let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
    assert_eq!(
        op,
        CollectionOp::FindOne {
            filter: doc! { "_id": oid },
            projection: None,
        }
    );
}

#[test]
fn test_string_arguments_may_contain_parentheses() {
    let (_, op) = collection_op(r#"db.notes.insertOne({"text": "a (nested) \"quote\")"})"#);
    assert_eq!(
        op,
        CollectionOp::InsertOne {
            document: doc! { "text": "a (nested) \"quote\")" },
        }
    );
}

#[test]
fn test_write_operations() {
    let (_, op) = collection_op(r#"db.items.insertMany([{"a": 1}, {"a": 2}])"#);
    assert!(op.is_write());
    assert_eq!(
        op,
        CollectionOp::InsertMany {
            documents: vec![doc! { "a": 1 }, doc! { "a": 2 }],
        }
    );

    let (_, op) = collection_op(r#"db.items.updateMany({"a": 1}, {"$set": {"b": true}})"#);
    assert_eq!(
        op,
        CollectionOp::UpdateMany {
            filter: doc! { "a": 1 },
            update: doc! { "$set": { "b": true } },
        }
    );

    let (_, op) = collection_op(r#"db.items.deleteOne({"a": 2})"#);
    assert_eq!(op, CollectionOp::DeleteOne { filter: doc! { "a": 2 } });
}

#[test]
fn test_aggregate_and_distinct() {
    let (_, op) = collection_op(r#"db.sales.aggregate([{"$match": {"region": "EU"}}, {"$count": "n"}])"#);
    assert_eq!(
        op,
        CollectionOp::Aggregate {
            pipeline: vec![doc! { "$match": { "region": "EU" } }, doc! { "$count": "n" }],
        }
    );

    let (_, op) = collection_op(r#"db.sales.distinct("region", {"year": 2024})"#);
    assert_eq!(
        op,
        CollectionOp::Distinct {
            field: "region".into(),
            filter: doc! { "year": 2024 },
        }
    );
}

#[test]
fn test_rejects_script_text() {
    assert_eq!(parse_command("   ;"), Err(CommandError::Empty));
    assert_eq!(
        parse_command("while(true) {}"),
        Err(CommandError::UnrecognizedShape)
    );
    assert!(matches!(
        parse_command("db.users.drop()"),
        Err(CommandError::UnsupportedMethod(m)) if m == "drop"
    ));
    // Shell expressions are not JSON
    assert!(matches!(
        parse_command("db.users.find({ age: { $gt: 1 } })"),
        Err(CommandError::InvalidArguments { .. })
    ));
    assert!(matches!(
        parse_command(r#"db.users.find({"a": ObjectId("x")})"#),
        Err(CommandError::InvalidArguments { .. })
    ));
}

#[test]
fn test_rejects_bad_arity_and_chaining() {
    assert!(matches!(
        parse_command(r#"db.users.deleteMany()"#),
        Err(CommandError::InvalidArguments { method, .. }) if method == "deleteMany"
    ));
    assert!(matches!(
        parse_command(r#"db.users.insertOne({"a": 1}, {"b": 2})"#),
        Err(CommandError::InvalidArguments { .. })
    ));
    assert!(matches!(
        parse_command(r#"db.users.countDocuments().limit(1)"#),
        Err(CommandError::InvalidArguments { method, .. }) if method == "limit"
    ));
    assert!(matches!(
        parse_command(r#"db.users.find().skip(-1)"#),
        Err(CommandError::InvalidArguments { .. })
    ));
    assert_eq!(
        parse_command(r#"db.users.find({"a": 1}"#),
        Err(CommandError::Unbalanced)
    );
}
