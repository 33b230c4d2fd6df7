//! End-to-end command handling through the router.

mod common;

use common::{Harness, OPENING};
use std::io::Write;
use z5_bot::error::GENERIC_FAILURE_NOTICE;
use z5_channels::{ChannelMessage, ChannelType};

const SELECT_PROMPT: &str = "Please use the /select command to select a game.";

#[tokio::test]
async fn start_greets_by_name() {
    let h = Harness::new();
    assert_eq!(
        h.say("42", "/start").await,
        [format!("Welcome, Ada!\n{SELECT_PROMPT}")]
    );
}

#[tokio::test]
async fn start_without_display_name() {
    let h = Harness::new();
    let msg = ChannelMessage::text(ChannelType::Telegram, "7", "7", "/start");
    h.router.handle(&msg).await;
    assert_eq!(h.channel.take("7"), [format!("Welcome, there!\n{SELECT_PROMPT}")]);
}

#[tokio::test]
async fn select_lists_codes_when_unknown() {
    let h = Harness::new();
    let listing = "For \"Zork 1\", write /select z1.\nFor \"Zork 2\", write /select z2.";

    assert_eq!(h.say("42", "/select").await, [listing]);
    assert_eq!(h.say("42", "/select z9").await, [listing]);
    assert_eq!(h.spawner.spawn_count(), 0);
}

#[tokio::test]
async fn select_starts_story_with_opening_text() {
    let h = Harness::new();

    assert_eq!(
        h.say("42", "/select Z1").await,
        [
            "Starting \"Zork 1\"...",
            "Your progress will be saved automatically.",
            OPENING,
        ]
    );
    assert!(h.log_for("42", "z1").await.is_empty());
    assert_eq!(h.spawner.live_count(), 1);

    assert_eq!(h.say("42", "open mailbox").await, ["[1] open mailbox"]);
    assert_eq!(h.log_for("42", "z1").await, ["open mailbox"]);
    assert_eq!(h.spawner.spawn_count(), 1);
}

#[tokio::test]
async fn select_uses_first_word_only() {
    let h = Harness::new();

    let replies = h.say("42", "/select z1 please").await;
    assert_eq!(replies[0], "Starting \"Zork 1\"...");
    assert_eq!(h.spawner.live_count(), 1);
}

#[tokio::test]
async fn gameplay_without_story_prompts_to_select() {
    let h = Harness::new();
    assert_eq!(h.say("42", "go north").await, [SELECT_PROMPT]);
    assert_eq!(h.spawner.spawn_count(), 0);
}

#[tokio::test]
async fn load_requires_story_and_progress() {
    let h = Harness::new();
    assert_eq!(
        h.say("42", "/load").await,
        ["You have to select a game first."]
    );

    h.say("42", "/select z1").await;
    assert_eq!(h.say("42", "/load").await, ["There is no progress to load."]);
}

#[tokio::test]
async fn clear_then_load() {
    let h = Harness::new();
    h.say("42", "/select z1").await;
    h.say("42", "go north").await;

    assert_eq!(
        h.say("42", "/clear").await,
        ["Deleting 1 messages. Please wait.", "Done."]
    );
    assert_eq!(h.say("42", "/load").await, ["There is no progress to load."]);
    assert_eq!(h.say("42", "/clear").await, ["There is no progress to clear."]);

    assert_eq!(h.say("42", "look").await, ["[1] look"]);
    assert_eq!(
        h.say("42", "/load").await,
        ["Restoring 1 messages. Please wait.", "Done.", "[1] look"]
    );
}

#[tokio::test]
async fn clear_requires_story() {
    let h = Harness::new();
    assert_eq!(
        h.say("42", "/clear").await,
        ["You have to select a game first."]
    );
}

#[tokio::test]
async fn reselect_keeps_log_and_offers_resume() {
    let h = Harness::new();
    h.say("42", "/select z1").await;
    h.say("42", "go north").await;

    let replies = h.say("42", "/select z1").await;
    assert_eq!(
        replies.last().unwrap(),
        "Some progress in Zork 1 already exists. Use /load to restore it or /clear to reset your recorded actions."
    );
    assert_eq!(h.log_for("42", "z1").await, ["go north"]);
    assert_eq!(h.spawner.live_count(), 0);

    // Next command cold-starts with the logged history.
    assert_eq!(h.say("42", "look").await, ["[2] look"]);
    assert_eq!(h.spawner.live_count(), 1);
}

#[tokio::test]
async fn switching_stories_preserves_other_logs() {
    let h = Harness::new();
    h.say("42", "/select z1").await;
    h.say("42", "go north").await;
    h.say("42", "/select z2").await;
    h.say("42", "go south").await;

    assert_eq!(h.log_for("42", "z1").await, ["go north"]);
    assert_eq!(h.log_for("42", "z2").await, ["go south"]);

    h.say("42", "/select z1").await;
    assert_eq!(
        h.say("42", "/load").await,
        ["Restoring 1 messages. Please wait.", "Done.", "[1] go north"]
    );
    assert_eq!(h.spawner.live_count(), 1);
}

#[tokio::test]
async fn enter_sends_empty_command() {
    let h = Harness::new();
    assert!(h.say("42", "/enter").await.is_empty());

    h.say("42", "/select z1").await;
    assert_eq!(h.say("42", "/enter").await, ["[1] "]);
    assert_eq!(h.log_for("42", "z1").await, [""]);
}

#[tokio::test]
async fn load_and_save_are_intercepted() {
    let h = Harness::new();
    h.say("42", "/select z1").await;

    assert_eq!(h.say("42", "LOAD").await, ["Please use /load."]);
    assert_eq!(
        h.say("42", "save").await,
        ["Your progress is being saved automatically. But /load is available."]
    );
    assert!(h.log_for("42", "z1").await.is_empty());
}

#[tokio::test]
async fn load_and_save_are_intercepted_without_story() {
    let h = Harness::new();

    assert_eq!(h.say("42", "load").await, ["Please use /load."]);
    assert_eq!(
        h.say("42", "Save").await,
        ["Your progress is being saved automatically. But /load is available."]
    );
    assert_eq!(h.spawner.spawn_count(), 0);
}

#[tokio::test]
async fn ping_and_ignore() {
    let h = Harness::new();
    assert_eq!(h.say("42", "/ping").await, ["Pong!"]);
    assert!(h.say("43", "/i brb").await.is_empty());
    assert_eq!(h.sessions.len(), 1);
}

#[tokio::test]
async fn return_key_hint_follows_output() {
    let h = Harness::new();
    h.say("42", "/select z1").await;

    assert_eq!(
        h.say("42", "wait").await,
        [
            "[1] Time passes. Press return to continue.",
            "(Note: You are able to use the return key by typing /enter.)",
        ]
    );
}

#[tokio::test]
async fn spawn_failure_shows_generic_notice() {
    let h = Harness::new();
    h.spawner.fail_spawns(true);

    let replies = h.say("42", "/select z1").await;
    assert_eq!(replies.last().unwrap(), GENERIC_FAILURE_NOTICE);

    // The conversation stays usable once the interpreter is back.
    h.spawner.fail_spawns(false);
    assert_eq!(h.say("42", "look").await, ["[1] look"]);
}

#[tokio::test]
async fn conversations_are_isolated() {
    let h = Harness::new();
    h.say("1", "/select z1").await;
    h.say("2", "/select z1").await;
    h.say("1", "north").await;

    assert_eq!(h.say("2", "south").await, ["[1] south"]);
    assert_eq!(h.log_for("1", "z1").await, ["north"]);
    assert_eq!(h.log_for("2", "z1").await, ["south"]);
}

fn notice_file(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{text}").unwrap();
    file
}

#[tokio::test]
async fn broadcast_fires_at_most_once() {
    let notice = notice_file("z5bot restarts at noon.\n");
    let h = Harness::with_broadcast(true, Some(notice.path().to_path_buf()));

    for conv in ["1", "2", "3"] {
        h.say(conv, "/select z1").await;
        h.say(conv, "look").await;
    }
    h.channel.mark_unreachable("2");

    assert!(h.say("admin", "/broadcast").await.is_empty());
    assert_eq!(h.channel.take("1"), ["z5bot restarts at noon."]);
    assert_eq!(h.channel.take("3"), ["z5bot restarts at noon."]);
    assert!(h.broadcaster.gate().has_fired());

    h.say("admin", "/broadcast").await;
    assert_eq!(h.channel.total_sent(), 0);
}

#[tokio::test]
async fn broadcast_disabled_is_silent() {
    let h = Harness::new();
    h.say("1", "/select z1").await;
    h.say("1", "look").await;

    assert!(h.say("admin", "/broadcast").await.is_empty());
    assert_eq!(h.channel.total_sent(), 0);
}

#[tokio::test]
async fn unreadable_notice_releases_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::with_broadcast(true, Some(dir.path().join("missing.txt")));

    h.say("admin", "/broadcast").await;
    assert!(!h.broadcaster.gate().has_fired());
}
