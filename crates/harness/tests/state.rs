use std::cell::RefCell;
use std::rc::Rc;

use ideaflash_core::{LocalId, NewNote, NotePatch, OwnerToken, UserId};
use ideaflash_engine::logging::init_logging;
use ideaflash_engine::{ClientConfig, NotesSnapshot, NotesState, Session, SessionFile};
use ideaflash_harness::{TestDevice, remote_note};

// ============================================================================
// Local CRUD
// ============================================================================

#[test]
fn crud_keeps_snapshot_in_step_with_store() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.state.load_notes()?;
    assert!(device.state.notes().is_empty());

    let first = device.state.create_note(NewNote::new("", "first"))?;
    let second = device.state.create_note(NewNote::new("", "second"))?;
    assert!(first.flash_id.is_anonymous());
    assert_eq!(device.state.notes()[0].local_id, second.local_id);

    let edited = device
        .state
        .update_note(&first.local_id, &NotePatch::title("First"))?;
    assert_eq!(edited.title, "First");
    assert!(device.state.notes().contains(&edited));

    device.state.delete_note(&second.local_id)?;
    assert_eq!(device.state.notes(), &[edited][..]);
    assert_eq!(device.local_notes()?, device.state.notes());

    let snapshot = device.state.snapshot();
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
    Ok(())
}

#[test]
fn local_failure_reports_error_and_keeps_list() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.state.create_note(NewNote::new("keep", ""))?;
    let before = device.state.notes().to_vec();

    assert!(device.state.create_note(NewNote::new(" ", "")).is_err());
    assert_eq!(device.state.notes(), &before[..]);
    assert_eq!(
        device.state.snapshot().error.as_deref(),
        Some("A note needs a title or some content.")
    );

    let missing = LocalId::from_string("missing");
    assert!(device.state.update_note(&missing, &NotePatch::title("x")).is_err());
    assert_eq!(
        device.state.snapshot().error.as_deref(),
        Some("That note no longer exists.")
    );
    assert_eq!(device.state.notes(), &before[..]);

    // the next action starts with a clean slate
    device.state.load_notes()?;
    assert!(device.state.snapshot().error.is_none());
    Ok(())
}

#[test]
fn deleting_missing_note_is_success() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.state.delete_note(&LocalId::from_string("gone"))?;
    assert!(device.state.snapshot().error.is_none());
    Ok(())
}

// ============================================================================
// Remote mirroring
// ============================================================================

#[test]
fn authenticated_writes_reach_remote() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.login("u1")?;
    assert!(device.state.is_authenticated());
    assert_eq!(
        device.state.owner(),
        OwnerToken::User(UserId::from_string("u1"))
    );

    let note = device.state.create_note(NewNote::new("Synced", "v1"))?;
    assert!(!note.flash_id.is_anonymous());
    assert_eq!(device.remote.flash_ids(), vec![note.flash_id.clone()]);

    device
        .state
        .update_note(&note.local_id, &NotePatch::content("v2"))?;
    assert_eq!(device.remote.notes()[0].content, "v2");

    device.state.delete_note(&note.local_id)?;
    assert!(device.remote.notes().is_empty());
    Ok(())
}

#[test]
fn remote_failures_never_surface() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.login("u1")?;
    device.remote.set_writes_failing(true);

    let note = device.state.create_note(NewNote::new("", "offline write"))?;
    assert!(device.state.snapshot().error.is_none());
    device
        .state
        .update_note(&note.local_id, &NotePatch::content("edited offline"))?;
    assert!(device.state.snapshot().error.is_none());

    assert!(device.remote.notes().is_empty());
    assert_eq!(device.local_notes()?.len(), 1);
    assert_eq!(device.state.notes()[0].content, "edited offline");

    device.state.delete_note(&note.local_id)?;
    assert!(device.state.snapshot().error.is_none());
    assert!(device.local_notes()?.is_empty());
    Ok(())
}

#[test]
fn unauthenticated_writes_stay_local() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.state.create_note(NewNote::new("", "local"))?;
    assert!(device.remote.create_attempts().is_empty());
    Ok(())
}

// ============================================================================
// Search
// ============================================================================

#[test]
fn search_overwrites_list_and_clear_reloads() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.state.create_note(NewNote::new("Groceries", "Milk and eggs"))?;
    device.state.create_note(NewNote::new("Trip", "pack the tent"))?;
    device.state.create_note(NewNote::new("", "buy MILK tomorrow"))?;

    device.state.search("milk")?;
    assert_eq!(device.state.snapshot().search_term, "milk");
    assert_eq!(device.state.notes().len(), 2);
    assert!(device.state.notes().iter().all(|n| n.matches("milk")));

    // searching narrows what is loaded, not the store
    device.state.search("tent")?;
    assert!(device.state.notes().is_empty());

    device.state.clear_search()?;
    assert_eq!(device.state.snapshot().search_term, "");
    assert_eq!(device.state.notes().len(), 3);

    device.state.search("tent")?;
    assert_eq!(device.state.notes().len(), 1);
    device.state.search("   ")?;
    assert_eq!(device.state.notes().len(), 3);
    Ok(())
}

#[test]
fn tag_filter_keeps_tagged_notes() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device
        .state
        .create_note(NewNote::new("a", "").with_tags(["work"]))?;
    device
        .state
        .create_note(NewNote::new("b", "").with_tags(["home", "Work"]))?;
    device.state.create_note(NewNote::new("c", ""))?;

    device.state.filter_by_tag("work");
    let titles: Vec<&str> = device.state.notes().iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["b", "a"]);
    Ok(())
}

// ============================================================================
// Subscriptions
// ============================================================================

#[test]
fn subscribers_see_changes_until_unsubscribed() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    let seen: Rc<RefCell<Vec<NotesSnapshot>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let id = device
        .state
        .subscribe(move |snapshot| sink.borrow_mut().push(snapshot.clone()));

    device.state.create_note(NewNote::new("", "hello"))?;
    {
        let seen = seen.borrow();
        assert!(seen.len() >= 2);
        assert!(seen[0].loading);
        let last = seen.last().ok_or("no notification")?;
        assert!(!last.loading);
        assert_eq!(last.notes.len(), 1);
    }

    assert!(device.state.unsubscribe(id));
    assert!(!device.state.unsubscribe(id));
    let count = seen.borrow().len();
    device.state.create_note(NewNote::new("", "unseen"))?;
    assert_eq!(seen.borrow().len(), count);
    Ok(())
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[test]
fn logout_clears_store_and_session() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.remote.seed(remote_note("1700000000100_u1", "remote", ""));
    device.login("u1")?;
    assert_eq!(device.local_notes()?.len(), 1);

    device.state.logout()?;
    assert!(device.local_notes()?.is_empty());
    assert!(device.state.notes().is_empty());
    assert!(!device.state.is_authenticated());
    assert_eq!(device.state.owner(), OwnerToken::Anonymous);
    // the remote keeps its copy
    assert_eq!(device.remote.notes().len(), 1);
    assert_eq!(device.remote.sign_outs(), 1);

    // nothing left to sign out of
    device.state.logout()?;
    assert_eq!(device.remote.sign_outs(), 1);
    Ok(())
}

#[test]
fn failed_sign_out_still_logs_out() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = TestDevice::new();
    device.login("u1")?;
    device.state.create_note(NewNote::new("", "private"))?;
    device.remote.set_writes_failing(true);

    device.state.logout()?;
    assert_eq!(device.remote.sign_outs(), 1);
    assert!(device.state.snapshot().error.is_none());
    assert!(!device.state.is_authenticated());
    assert!(device.local_notes()?.is_empty());
    Ok(())
}

#[test]
fn open_restores_saved_session() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let config = ClientConfig {
        database_file: dir.path().join("notes.db"),
        api_base_url: Some("http://127.0.0.1:9/api".to_string()),
        request_timeout_secs: 5,
        session_file: dir.path().join("session.json"),
    };
    let config_path = dir.path().join("config.json");
    config.save(&config_path)?;
    let config = ClientConfig::load(&config_path)?;

    let session = Session::new("token-u1", UserId::from_string("u1"));
    SessionFile::new(&config.session_file).save(&session)?;

    let mut state = NotesState::open(&config)?;
    assert!(state.is_authenticated());
    assert_eq!(state.session().map(|s| s.user_id().as_str()), Some("u1"));

    // local notes work without touching the network
    state.load_notes()?;
    assert!(state.notes().is_empty());
    Ok(())
}

#[test]
fn open_without_remote_is_local_only() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = ClientConfig {
        database_file: dir.path().join("notes.db"),
        session_file: dir.path().join("session.json"),
        ..ClientConfig::default()
    };

    let mut state = NotesState::open(&config)?;
    assert!(!state.is_authenticated());
    state.create_note(NewNote::new("", "kept on disk"))?;
    drop(state);

    let mut state = NotesState::open(&config)?;
    state.load_notes()?;
    assert_eq!(state.notes().len(), 1);
    Ok(())
}
