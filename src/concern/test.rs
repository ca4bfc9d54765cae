use std::time::Duration;

use crate::{
    bson::{doc, Bson},
    concern::{Acknowledgment, ReadConcern, ReadConcernLevel, WriteConcern},
};

#[test]
fn write_concern_is_acknowledged() {
    let w_1 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(1))
        .journal(false)
        .build();
    assert!(w_1.is_acknowledged());

    let w_majority = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .journal(false)
        .build();
    assert!(w_majority.is_acknowledged());

    let w_0 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(false)
        .build();
    assert!(!w_0.is_acknowledged());

    let w_0 = WriteConcern::builder().w(Acknowledgment::Nodes(0)).build();
    assert!(!w_0.is_acknowledged());

    let empty = WriteConcern::builder().build();
    assert!(empty.is_acknowledged());

    let empty = WriteConcern::builder().journal(false).build();
    assert!(empty.is_acknowledged());

    let empty = WriteConcern::builder().journal(true).build();
    assert!(empty.is_acknowledged());
}

#[test]
fn write_concern_is_server_default() {
    assert!(WriteConcern::builder().build().is_server_default());
    assert!(!WriteConcern::nodes(1).is_server_default());
    assert!(!WriteConcern::majority().is_server_default());
    assert!(!WriteConcern::builder().journal(true).build().is_server_default());
    assert!(!WriteConcern::builder()
        .w_timeout(Duration::from_millis(100))
        .build()
        .is_server_default());
}

#[test]
fn read_concern_is_server_default() {
    assert!(ReadConcern::local().is_server_default());
    assert!(!ReadConcern::majority().is_server_default());
    assert!(!ReadConcern::custom("available").is_server_default());
}

#[test]
fn write_concern_validate_rejects_w0_and_journal() {
    let invalid = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(true)
        .build();
    assert!(invalid.validate().is_err());

    let valid = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(false)
        .build();
    assert!(valid.validate().is_ok());
}

#[test]
fn write_concern_deserialize() {
    let w_1 = doc! { "w": 1 };
    let wc: WriteConcern = bson::from_bson(Bson::Document(w_1)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Nodes(1).into(),
            w_timeout: None,
            journal: None
        }
    );

    let w_majority = doc! { "w": "majority" };
    let wc: WriteConcern = bson::from_bson(Bson::Document(w_majority)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Majority.into(),
            w_timeout: None,
            journal: None
        }
    );

    let w_timeout = doc! { "w": "majority", "wtimeout": 100 };
    let wc: WriteConcern = bson::from_bson(Bson::Document(w_timeout)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Majority.into(),
            w_timeout: Duration::from_millis(100).into(),
            journal: None
        }
    );

    let journal = doc! { "w": "majority", "j": true };
    let wc: WriteConcern = bson::from_bson(Bson::Document(journal)).unwrap();
    assert_eq!(
        wc,
        WriteConcern {
            w: Acknowledgment::Majority.into(),
            w_timeout: None,
            journal: true.into()
        }
    );
}

#[test]
fn write_concern_serialize_roundtrips_through_bson() {
    let wc = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .journal(true)
        .w_timeout(Duration::from_millis(500))
        .build();
    let doc = bson::to_document(&wc).unwrap();
    assert_eq!(doc.get_str("w").unwrap(), "majority");
    assert_eq!(doc.get_bool("j").unwrap(), true);
    assert_eq!(doc.get_i64("wtimeout").unwrap(), 500);

    let round_tripped: WriteConcern = bson::from_document(doc).unwrap();
    assert_eq!(round_tripped, wc);
}

#[test]
fn acknowledgment_from_str_preserves_custom_tags() {
    assert_eq!(Acknowledgment::from("majority"), Acknowledgment::Majority);
    assert_eq!(
        Acknowledgment::from("multi-dc"),
        Acknowledgment::Custom("multi-dc".to_string())
    );
    assert_eq!(Acknowledgment::from(3u32), Acknowledgment::Nodes(3));
}

#[test]
fn read_concern_level_round_trips_through_bson() {
    for (level, expected) in [
        (ReadConcern::local(), "local"),
        (ReadConcern::majority(), "majority"),
        (ReadConcern::linearizable(), "linearizable"),
        (ReadConcern::available(), "available"),
        (ReadConcern::snapshot(), "snapshot"),
    ] {
        let doc = bson::to_document(&level).unwrap();
        assert_eq!(doc.get_str("level").unwrap(), expected);
        let round_tripped: ReadConcern = bson::from_document(doc).unwrap();
        assert_eq!(round_tripped, level);
    }
}

#[test]
fn read_concern_custom_level_is_preserved_verbatim() {
    let custom = ReadConcern::custom("majorityButNewer");
    assert!(matches!(custom.level, ReadConcernLevel::Custom(ref s) if s == "majorityButNewer"));
    let doc = bson::to_document(&custom).unwrap();
    assert_eq!(doc.get_str("level").unwrap(), "majorityButNewer");
}
