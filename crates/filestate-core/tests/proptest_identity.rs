//! Property-based tests for content identity, protection and trigger gating.

use filestate_core::{
    content_digest, validate_protected, ContentSnapshot, ContentSnapshotEngine, FileEngine,
    FileSnapshot, FileSnapshotEngine, FileBackend, ManagedFile, MemoryBackend, StaticSecret,
};
use filestate_core::secret::UNPROTECTED_HMAC_SECRET;
use proptest::prelude::*;

fn any_content() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..2048)
}

fn any_key() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,48}"
}

proptest! {
    /// Same inputs, same digest; always 64 lowercase hex characters.
    #[test]
    fn test_digest_is_deterministic(content in any_content(), key in any_key()) {
        let a = content_digest(&content, &key).unwrap();
        let b = content_digest(&content, &key).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
        prop_assert!(a.bytes().all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c)));
    }

    /// A digest validates against its own content and key.
    #[test]
    fn test_protection_round_trip(content in any_content(), key in any_key()) {
        let id = content_digest(&content, &key).unwrap();
        prop_assert!(validate_protected(true, &id, &key, &content).is_ok());
    }

    /// Changing the content breaks validation.
    #[test]
    fn test_protection_rejects_other_content(content in any_content(), key in any_key(), extra in any::<u8>()) {
        let id = content_digest(&content, &key).unwrap();
        let mut other = content.clone();
        other.push(extra);
        prop_assert!(validate_protected(true, &id, &key, &other).is_err());
    }

    /// Changing the key breaks validation.
    #[test]
    fn test_protection_rejects_other_key(content in any_content(), key in any_key(), other in any_key()) {
        prop_assume!(key != other);
        let id = content_digest(&content, &key).unwrap();
        prop_assert!(validate_protected(true, &id, &other, &content).is_err());
    }

    /// Changing the identifier breaks validation.
    #[test]
    fn test_protection_rejects_other_identifier(content in any_content(), key in any_key(), pos in 0usize..64) {
        let id = content_digest(&content, &key).unwrap();
        let mut chars: Vec<char> = id.chars().collect();
        chars[pos] = if chars[pos] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        prop_assert!(validate_protected(true, &tampered, &key, &content).is_err());
    }

    /// Unprotected records never persist a key and always carry the fallback identity.
    #[test]
    fn test_unprotected_normalization(
        contents in "[ -~]{0,256}",
        supplied_id in "[0-9a-f]{0,64}",
        supplied_key in "[a-z]{0,16}",
        env_key in proptest::option::of("[a-z]{1,16}"),
    ) {
        let engine = FileEngine::new(MemoryBackend::new(), StaticSecret(env_key));
        let mut plan = ManagedFile::new("f.txt", contents.clone());
        plan.identifier = supplied_id;
        plan.secret_key = supplied_key;

        let created = engine.create(&plan).unwrap();
        prop_assert!(created.secret_key.is_empty());
        prop_assert_eq!(&created.identifier, &content_digest(contents.as_bytes(), UNPROTECTED_HMAC_SECRET).unwrap());

        let updated = engine.update(&plan, &created).unwrap();
        prop_assert!(updated.secret_key.is_empty());
        prop_assert_eq!(updated.identifier, created.identifier);
    }

    /// Artifacts change exactly when the trigger changes, whatever the source does.
    #[test]
    fn test_snapshot_trigger_gating(
        steps in proptest::collection::vec(("[a-c]", "[ -~]{0,64}"), 1..12),
    ) {
        let backend = MemoryBackend::new()
            .with_file("./src", b"initial", "0600")
            .unwrap();
        let engine = FileSnapshotEngine::new(backend);
        let mut state = engine.create(&FileSnapshot::new("src", "start")).unwrap();

        for (trigger, source) in steps {
            FileBackend::create(engine.cache().backend(), ".", "src", source.as_bytes(), "0600").unwrap();
            let next = engine.update(&FileSnapshot::new("src", trigger.clone()), &state).unwrap();
            if trigger == state.trigger {
                prop_assert_eq!(&next.artifact, &state.artifact);
                prop_assert_eq!(&next.identifier, &state.identifier);
            } else {
                prop_assert_eq!(&next.artifact, &filestate_core::codec::encode(source.as_bytes()));
            }
            state = next;
        }
    }

    /// Content snapshots follow the same trigger rule.
    #[test]
    fn test_content_snapshot_trigger_gating(
        steps in proptest::collection::vec(("[a-c]", "[ -~]{0,64}"), 1..12),
    ) {
        let engine = ContentSnapshotEngine::new();
        let mut state = engine.create(&ContentSnapshot::new("initial", "start")).unwrap();
        for (trigger, contents) in steps {
            let next = engine.update(&ContentSnapshot::new(contents.clone(), trigger.clone()), &state).unwrap();
            if trigger == state.trigger {
                prop_assert_eq!(&next.snapshot, &state.snapshot);
            } else {
                prop_assert_eq!(&next.snapshot, &contents);
            }
            state = next;
        }
    }
}
