use adachi_kv::{keys, CommandName, Error, KeyValueStore, MemoryTransport};
use rand::Rng;
use std::collections::HashMap;
use tokio::time::{advance, Duration};

fn store() -> (KeyValueStore, MemoryTransport) {
    let memory = MemoryTransport::new();
    (KeyValueStore::new(memory.clone()), memory)
}

fn names(memory: &MemoryTransport) -> Vec<CommandName> {
    memory.commands().iter().map(|cmd| cmd.name()).collect()
}

#[tokio::test]
async fn missing_keys_read_as_empty_values() {
    let (store, _) = store();

    assert_eq!(store.get_string("missing").await.unwrap(), "");
    assert_eq!(store.get_hash("missing").await.unwrap(), HashMap::new());
    assert_eq!(store.get_hash_field("missing", "f").await.unwrap(), "");
    assert!(store.get_list("missing").await.unwrap().is_empty());
    assert_eq!(store.get_list_length("missing").await.unwrap(), 0);
    assert_eq!(store.get_list_by_index("missing", 0).await.unwrap(), "");
    assert!(store.get_set("missing").await.unwrap().is_empty());
    assert_eq!(store.get_set_member_num("missing").await.unwrap(), 0);
    assert_eq!(store.get_timeout("missing").await.unwrap(), -2);
    assert!(!store.exist_hash_key("missing", "f").await);
    assert!(!store.exist_set_member("missing", "x").await);
    assert!(!store.exist_list_element("missing", "x").await.unwrap());
}

#[tokio::test]
async fn strings() {
    let (store, _) = store();

    store.set_string("a", "v", None).await.unwrap();
    assert_eq!(store.get_string("a").await.unwrap(), "v");
    assert_eq!(store.get_timeout("a").await.unwrap(), -1);

    store.set_string("a", 42, None).await.unwrap();
    assert_eq!(store.get_string("a").await.unwrap(), "42");

    store.delete_key(["a"]).await.unwrap();
    assert_eq!(store.get_string("a").await.unwrap(), "");
}

#[tokio::test(start_paused = true)]
async fn set_string_with_timeout_expires() {
    let (store, memory) = store();

    store.set_string("a", "v", Some(10)).await.unwrap();

    let ttl = store.get_timeout("a").await.unwrap();
    assert!((1..=10).contains(&ttl), "ttl out of range: {}", ttl);
    // Value and expiry go out as a single command.
    assert_eq!(names(&memory), vec![CommandName::Setex, CommandName::Ttl]);

    advance(Duration::from_secs(4)).await;
    assert_eq!(store.get_timeout("a").await.unwrap(), 6);

    advance(Duration::from_secs(7)).await;
    assert_eq!(store.get_string("a").await.unwrap(), "");
    assert_eq!(store.get_timeout("a").await.unwrap(), -2);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_is_not_missing() {
    let (store, _) = store();
    store.set_string("a", "v", Some(1)).await.unwrap();

    advance(Duration::from_millis(600)).await;

    // Under half a second left rounds to 0, the key is still there.
    assert_eq!(store.get_timeout("a").await.unwrap(), 0);
    assert_eq!(store.get_string("a").await.unwrap(), "v");
}

#[tokio::test]
async fn out_of_range_timeouts_are_server_errors() {
    let (store, _) = store();
    store.set_string("a", "v", None).await.unwrap();

    let err = store.set_timeout("a", i64::MAX as u64).await.unwrap_err();
    assert!(err.is_server_error(), "unexpected error: {}", err);

    let err = store
        .set_string("b", "v", Some(i64::MAX as u64))
        .await
        .unwrap_err();
    assert!(err.is_server_error(), "unexpected error: {}", err);

    assert_eq!(store.get_timeout("a").await.unwrap(), -1);
    assert_eq!(store.get_string("b").await.unwrap(), "");
}

#[tokio::test(start_paused = true)]
async fn set_timeout_refreshes_expiry() {
    let (store, _) = store();

    store.set_hash_field("h", "f", "v").await.unwrap();
    store.set_timeout("h", 5).await.unwrap();
    assert_eq!(store.get_timeout("h").await.unwrap(), 5);

    advance(Duration::from_secs(3)).await;
    store.set_timeout("h", 5).await.unwrap();

    advance(Duration::from_secs(3)).await;
    assert_eq!(store.get_hash_field("h", "f").await.unwrap(), "v");

    advance(Duration::from_secs(3)).await;
    assert_eq!(store.get_hash("h").await.unwrap(), HashMap::new());
}

#[tokio::test]
async fn set_timeout_on_missing_key_does_nothing() {
    let (store, _) = store();

    store.set_timeout("missing", 5).await.unwrap();

    assert_eq!(store.get_timeout("missing").await.unwrap(), -2);
}

#[tokio::test]
async fn delete_key_sends_one_command_per_key() {
    let (store, memory) = store();
    store.set_string("a", "1", None).await.unwrap();
    store.set_string("b", "2", None).await.unwrap();
    memory.clear_commands();

    store.delete_key(["a", "b", "missing"]).await.unwrap();

    let commands = memory.commands();
    assert_eq!(commands.len(), 3);
    assert!(commands.iter().all(|cmd| cmd.name() == CommandName::Del));
    assert!(commands.iter().all(|cmd| cmd.arguments().len() == 1));
    assert_eq!(store.get_string("a").await.unwrap(), "");
    assert_eq!(store.get_string("b").await.unwrap(), "");
}

#[tokio::test]
async fn get_keys_by_prefix_returns_only_prefixed_keys() {
    let (store, _) = store();
    let alice = keys::record(keys::USER_INFO, 1);
    let bob = keys::record(keys::USER_INFO, 2);
    store.set_hash_field(&alice, "name", "alice").await.unwrap();
    store.set_hash_field(&bob, "name", "bob").await.unwrap();
    store.set_string(keys::HELP_DATA, "{}", None).await.unwrap();
    store.set_string("other.user-info-3", "x", None).await.unwrap();

    let mut found = store.get_keys_by_prefix(keys::USER_INFO).await.unwrap();
    found.sort();

    assert_eq!(found, vec![alice, bob]);
    assert!(store.get_keys_by_prefix("nothing").await.unwrap().is_empty());
}

#[tokio::test]
async fn get_keys_by_prefix_matches_any_character() {
    let (store, _) = store();
    store.set_string("adachi.a/b", "v", None).await.unwrap();
    store.set_string("adachi.c", "v", None).await.unwrap();
    store.set_string("adachi*x", "v", None).await.unwrap();
    store.set_string("adachi*[y]", "v", None).await.unwrap();

    let mut found = store.get_keys_by_prefix("adachi.").await.unwrap();
    found.sort();
    assert_eq!(found, vec!["adachi.a/b", "adachi.c"]);

    // Glob characters in a prefix are literal.
    let mut found = store.get_keys_by_prefix("adachi*").await.unwrap();
    found.sort();
    assert_eq!(found, vec!["adachi*[y]", "adachi*x"]);
    assert_eq!(
        store.get_keys_by_prefix("adachi*[").await.unwrap(),
        vec!["adachi*[y]"]
    );
}

#[tokio::test]
async fn hashes() {
    let (store, _) = store();

    store
        .set_hash("h", [("name", "adachi"), ("level", "3")])
        .await
        .unwrap();
    store.set_hash_field("h", "level", 4).await.unwrap();

    let hash = store.get_hash("h").await.unwrap();
    assert_eq!(hash.len(), 2);
    assert_eq!(hash["name"], "adachi");
    assert_eq!(hash["level"], "4");
    assert_eq!(store.get_hash_field("h", "name").await.unwrap(), "adachi");
    assert_eq!(store.get_hash_field("h", "missing").await.unwrap(), "");
    assert!(store.exist_hash_key("h", "name").await);
    assert!(!store.exist_hash_key("h", "missing").await);

    store.del_hash("h", ["name", "missing"]).await.unwrap();
    assert!(!store.exist_hash_key("h", "name").await);
    assert_eq!(store.get_hash("h").await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_writes_send_nothing() {
    let (store, memory) = store();
    let nothing: [&str; 0] = [];

    store
        .set_hash("h", std::iter::empty::<(&str, &str)>())
        .await
        .unwrap();
    store.del_hash("h", nothing).await.unwrap();
    store.add_list_element("l", nothing).await.unwrap();
    store.del_list_element("l", nothing).await.unwrap();
    store.add_set_member("s", nothing).await.unwrap();
    store.del_set_member("s", nothing).await.unwrap();
    store.delete_key(nothing).await.unwrap();

    assert!(memory.commands().is_empty());
}

#[tokio::test]
async fn inc_hash_picks_integer_or_float_command() {
    let (store, memory) = store();

    store.inc_hash("h", "f", 3).await.unwrap();
    store.inc_hash("h", "f", 2).await.unwrap();
    assert_eq!(store.get_hash_field("h", "f").await.unwrap(), "5");

    store.inc_hash("h", "g", 1.5).await.unwrap();
    assert_eq!(store.get_hash_field("h", "g").await.unwrap(), "1.5");

    // Whole floats count as integers.
    store.inc_hash("h", "f", 2.0).await.unwrap();
    assert_eq!(store.get_hash_field("h", "f").await.unwrap(), "7");

    store.inc_hash("h", "f", -10).await.unwrap();
    assert_eq!(store.get_hash_field("h", "f").await.unwrap(), "-3");

    let increments: Vec<CommandName> = names(&memory)
        .into_iter()
        .filter(|name| *name != CommandName::Hget)
        .collect();
    assert_eq!(
        increments,
        vec![
            CommandName::Hincrby,
            CommandName::Hincrby,
            CommandName::Hincrbyfloat,
            CommandName::Hincrby,
            CommandName::Hincrby,
        ]
    );
}

#[tokio::test]
async fn inc_key() {
    let (store, memory) = store();

    store.inc_key("counter", 1).await.unwrap();
    store.inc_key("counter", 41).await.unwrap();
    assert_eq!(store.get_string("counter").await.unwrap(), "42");

    store.inc_key("ratio", 0.25).await.unwrap();
    store.inc_key("ratio", 0.25).await.unwrap();
    assert_eq!(store.get_string("ratio").await.unwrap(), "0.5");

    let names = names(&memory);
    assert_eq!(names[0], CommandName::Incrby);
    assert_eq!(names[3], CommandName::Incrbyfloat);
}

#[tokio::test]
async fn float_increments_read_back_without_binary_noise() {
    let (store, _) = store();

    store.inc_key("k", 0.1).await.unwrap();
    store.inc_key("k", 0.2).await.unwrap();
    store.inc_hash("h", "f", 0.1).await.unwrap();
    store.inc_hash("h", "f", 0.2).await.unwrap();

    assert_eq!(store.get_string("k").await.unwrap(), "0.3");
    assert_eq!(store.get_hash_field("h", "f").await.unwrap(), "0.3");
}

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let (store, _) = store();
    let amounts: Vec<i64> = {
        let mut rng = rand::thread_rng();
        (0..50).map(|_| rng.gen_range(-1000..1000)).collect()
    };

    let tasks: Vec<_> = amounts
        .iter()
        .map(|&amount| {
            let store = store.clone();
            tokio::spawn(async move { store.inc_key("counter", amount).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let total: i64 = amounts.iter().sum();
    assert_eq!(store.get_string("counter").await.unwrap(), total.to_string());
}

#[tokio::test]
async fn increment_of_non_numeric_value_is_a_server_error() {
    let (store, _) = store();
    store.set_hash_field("h", "f", "abc").await.unwrap();

    let err = store.inc_hash("h", "f", 1).await.unwrap_err();

    assert!(err.is_server_error(), "unexpected error: {}", err);
}

#[tokio::test]
async fn lists() {
    let (store, memory) = store();

    store.add_list_element("l", ["x", "y"]).await.unwrap();
    assert_eq!(store.get_list("l").await.unwrap(), vec!["x", "y"]);

    store.add_list_element("l", ["x", "z"]).await.unwrap();
    assert_eq!(store.get_list_length("l").await.unwrap(), 4);
    assert_eq!(store.get_list_by_index("l", 0).await.unwrap(), "x");
    assert_eq!(store.get_list_by_index("l", -1).await.unwrap(), "z");
    assert_eq!(store.get_list_by_index("l", 10).await.unwrap(), "");
    assert!(store.exist_list_element("l", "z").await.unwrap());

    memory.clear_commands();
    store.del_list_element("l", ["x", "z"]).await.unwrap();

    // Every occurrence of each value, one command per value.
    assert_eq!(names(&memory), vec![CommandName::Lrem, CommandName::Lrem]);
    assert_eq!(store.get_list("l").await.unwrap(), vec!["y"]);
    assert!(!store.exist_list_element("l", "x").await.unwrap());
}

#[tokio::test]
async fn list_membership_compares_string_forms() {
    let (store, _) = store();

    store.add_list_element("l", [1, 2, 3]).await.unwrap();

    assert!(store.exist_list_element("l", 2).await.unwrap());
    assert!(store.exist_list_element("l", "3").await.unwrap());
    assert!(!store.exist_list_element("l", 4).await.unwrap());
}

#[tokio::test]
async fn sets() {
    let (store, _) = store();

    store.add_set_member("s", ["x"]).await.unwrap();
    store.add_set_member("s", ["x"]).await.unwrap();
    assert_eq!(store.get_set_member_num("s").await.unwrap(), 1);

    store.add_set_member("s", ["y", "z"]).await.unwrap();
    let mut members = store.get_set("s").await.unwrap();
    members.sort();
    assert_eq!(members, vec!["x", "y", "z"]);
    assert!(store.exist_set_member("s", "x").await);
    assert!(!store.exist_set_member("s", "w").await);

    store.del_set_member("s", ["x", "w"]).await.unwrap();
    assert_eq!(store.get_set_member_num("s").await.unwrap(), 2);
    assert!(!store.exist_set_member("s", "x").await);
}

#[tokio::test]
async fn existence_checks_read_failures_as_absent() {
    let (store, memory) = store();
    store.set_hash_field("h", "f", "v").await.unwrap();
    store.add_set_member("s", ["x"]).await.unwrap();

    memory.set_unavailable(true);

    assert!(!store.exist_hash_key("h", "f").await);
    assert!(!store.exist_set_member("s", "x").await);

    memory.set_unavailable(false);

    assert!(store.exist_hash_key("h", "f").await);
    assert!(store.exist_set_member("s", "x").await);
}

#[tokio::test]
async fn other_operations_propagate_failures() {
    let (store, memory) = store();
    memory.set_unavailable(true);

    assert!(matches!(
        store.get_string("a").await,
        Err(Error::Connection(_))
    ));
    assert!(store.set_string("a", "v", None).await.is_err());
    assert!(store.get_hash("h").await.is_err());
    assert!(store.inc_key("counter", 1).await.is_err());
    assert!(store.exist_list_element("l", "x").await.is_err());
    assert!(store.delete_key(["a", "b"]).await.is_err());
}

#[tokio::test]
async fn wrong_type_is_a_server_error() {
    let (store, _) = store();
    store.set_string("a", "v", None).await.unwrap();

    let err = store.get_hash("a").await.unwrap_err();

    match err {
        Error::Server(msg) => assert!(msg.starts_with("WRONGTYPE"), "{}", msg),
        err => panic!("unexpected error: {}", err),
    }
    assert!(store.add_list_element("a", ["x"]).await.is_err());
    assert!(store.get_set_member_num("a").await.is_err());
}

#[tokio::test]
async fn utf8_values_round_trip() {
    let (store, _) = store();

    store.set_string("a", "héllo wörld", None).await.unwrap();

    assert_eq!(store.get_string("a").await.unwrap(), "héllo wörld");
}
