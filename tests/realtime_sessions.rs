//! Two sessions over one database file, sharing a change feed.

use anyhow::Result;
use marginalia::{
    AnnotationStore, ChangeFeed, Database, DeletePolicy, DocumentId, Library, PermissionLevel,
    StaticIdentity, ViewerController,
};
use tempfile::TempDir;

struct Sessions {
    _dir: TempDir,
    feed: ChangeFeed,
    writer: Library,
    reader: Library,
    document: DocumentId,
}

/// ada owns a document shared with bob for commenting; `writer` acts as ada
/// and `reader` as bob.
fn sessions(policy: DeletePolicy) -> Result<Sessions> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("marginalia.db");
    let feed = ChangeFeed::default();

    let setup = Library::new(Database::open(&path)?);
    let ada = setup.create_user("ada", None)?;
    let bob = setup.create_user("bob", None)?;

    let writer = Library::new(setup.into_database())
        .with_feed(feed.clone())
        .with_delete_policy(policy)
        .with_identity(StaticIdentity::user(ada.id));
    let document = writer
        .create_document(Some("Shared"), "The quick brown fox jumps", None)?
        .id;
    writer.share_document(document, bob.id, PermissionLevel::Comment)?;

    let reader = Library::new(Database::open(&path)?)
        .with_feed(feed.clone())
        .with_delete_policy(policy)
        .with_identity(StaticIdentity::user(bob.id));

    Ok(Sessions {
        _dir: dir,
        feed,
        writer,
        reader,
        document,
    })
}

#[test]
fn inserts_from_another_session_appear_after_pump() -> Result<()> {
    let s = sessions(DeletePolicy::Orphan)?;
    let mut viewer = ViewerController::over(&s.reader);
    viewer.open(s.document);
    assert!(viewer.threads().is_empty());

    let highlight = s.writer.create_highlight(s.document, 4, 9, "quick")?;
    s.writer.create_comment(s.document, highlight.id, "nice")?;

    assert_eq!(viewer.pump_realtime(), 2);
    let threads = viewer.threads();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].comments.len(), 1);
    assert_eq!(threads[0].highlight.user.username, "ada");
    Ok(())
}

#[test]
fn events_for_other_documents_are_ignored() -> Result<()> {
    let s = sessions(DeletePolicy::Orphan)?;
    let other = s.writer.create_document(Some("Other"), "elsewhere", None)?.id;
    let mut viewer = ViewerController::over(&s.reader);
    viewer.open(s.document);

    s.writer.create_highlight(other, 0, 9, "elsewhere")?;

    assert_eq!(viewer.pump_realtime(), 0);
    Ok(())
}

#[test]
fn remote_delete_clears_selection() -> Result<()> {
    let s = sessions(DeletePolicy::Orphan)?;
    let highlight = s.writer.create_highlight(s.document, 16, 19, "fox")?;
    let mut viewer = ViewerController::over(&s.reader);
    viewer.open(s.document);
    viewer.select(Some(highlight.id));

    s.writer.delete(highlight.id)?;
    viewer.pump_realtime();

    assert!(viewer.annotations().is_empty());
    assert_eq!(viewer.selected(), None);
    Ok(())
}

#[test]
fn orphan_policy_leaves_replies_out_of_every_thread() -> Result<()> {
    let s = sessions(DeletePolicy::Orphan)?;
    let highlight = s.writer.create_highlight(s.document, 4, 9, "quick")?;
    let mut viewer = ViewerController::over(&s.reader);
    viewer.open(s.document);
    viewer.add_comment(highlight.id, "reply from bob")?;

    s.writer.delete(highlight.id)?;
    viewer.pump_realtime();

    assert_eq!(viewer.annotations().len(), 1);
    assert!(viewer.threads().is_empty());
    Ok(())
}

#[test]
fn cascade_policy_removes_replies_everywhere() -> Result<()> {
    let s = sessions(DeletePolicy::Cascade)?;
    let highlight = s.writer.create_highlight(s.document, 4, 9, "quick")?;
    let reply = s.writer.create_comment(s.document, highlight.id, "first")?;
    s.writer.create_comment(s.document, reply.id, "second")?;
    let mut viewer = ViewerController::over(&s.reader);
    viewer.open(s.document);
    assert_eq!(viewer.annotations().len(), 3);

    s.writer.delete(highlight.id)?;

    assert_eq!(viewer.pump_realtime(), 3);
    assert!(viewer.annotations().is_empty());
    Ok(())
}

#[test]
fn closing_viewers_releases_their_channels() -> Result<()> {
    let s = sessions(DeletePolicy::Orphan)?;
    let baseline = s.feed.receiver_count();

    {
        let mut first = ViewerController::over(&s.reader);
        let mut second = ViewerController::over(&s.writer);
        first.open(s.document);
        second.open(s.document);
        assert_eq!(s.feed.receiver_count(), baseline + 2);

        first.unmount();
        assert_eq!(s.feed.receiver_count(), baseline + 1);
    }

    assert_eq!(s.feed.receiver_count(), baseline);
    Ok(())
}

#[test]
fn reopening_switches_channels() -> Result<()> {
    let s = sessions(DeletePolicy::Orphan)?;
    let other = s.writer.create_document(Some("Other"), "elsewhere", None)?.id;
    let baseline = s.feed.receiver_count();
    let mut viewer = ViewerController::over(&s.writer);

    viewer.open(s.document);
    viewer.open(other);

    assert_eq!(s.feed.receiver_count(), baseline + 1);
    s.writer.create_highlight(s.document, 0, 3, "The")?;
    assert_eq!(viewer.pump_realtime(), 0);
    Ok(())
}
