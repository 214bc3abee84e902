//! End-to-end flows over the SQLite store and local sessions.

use std::rc::Rc;

use applytrack::auth::{AuthProvider, LocalAuth};
use applytrack::board::{BoardFilter, ColumnSort, SortKey};
use applytrack::db::Database;
use applytrack::drag::{DragController, DragEvent, DropDecision, DropLocation};
use applytrack::models::{ApplicationDraft, ApplicationStatus};
use applytrack::{Tracker, TrackerError};
use chrono::NaiveDate;

type SqliteTracker = Tracker<Rc<Database>, LocalAuth>;

fn open(dir: &tempfile::TempDir) -> anyhow::Result<(Rc<Database>, SqliteTracker)> {
    let db = Rc::new(Database::open_at(&dir.path().join("applytrack.db"))?);
    db.init()?;
    let auth = LocalAuth::new(Rc::clone(&db));
    let tracker = Tracker::new(Rc::clone(&db), auth);
    Ok((db, tracker))
}

fn draft(company: &str, status: ApplicationStatus, applied: Option<(i32, u32, u32)>) -> ApplicationDraft {
    ApplicationDraft {
        company_name: company.into(),
        job_title: "Engineer".into(),
        status,
        applied_date: applied.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        tags_input: "rust".into(),
        ..Default::default()
    }
}

#[test]
fn requires_login_before_reading() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_db, mut tracker) = open(&dir)?;

    assert_eq!(tracker.applications().err(), Some(TrackerError::Auth));

    tracker.auth().sign_in("alice@example.com", Some("Alice"))?;
    assert!(tracker.applications()?.is_empty());
    Ok(())
}

#[test]
fn status_change_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let id = {
        let (_db, mut tracker) = open(&dir)?;
        tracker.auth().sign_in("alice@example.com", None)?;
        let app = tracker.create_application(&draft("Acme", ApplicationStatus::Applied, None))?;

        let mut dnd = DragController::new();
        let decision = tracker.handle_drag(
            &mut dnd,
            DragEvent::Drop {
                id: app.id.clone(),
                source: DropLocation { column: ApplicationStatus::Applied, index: 0 },
                destination: Some(DropLocation { column: ApplicationStatus::Rejected, index: 0 }),
            },
        )?;
        assert!(matches!(decision, DropDecision::AwaitReason { .. }));
        tracker.confirm_rejection(&mut dnd, "No New Applicants", "role paused")?;
        app.id
    };

    let db = Rc::new(Database::open_at(&dir.path().join("applytrack.db"))?);
    db.ensure_initialized()?;
    let mut tracker = Tracker::new(Rc::clone(&db), LocalAuth::new(Rc::clone(&db)));
    let app = tracker.resolve_application(&id)?;
    assert_eq!(app.status, ApplicationStatus::Rejected);
    assert_eq!(app.rejection_reason.as_deref(), Some("No New Applicants - role paused"));
    assert_eq!(app.tags, vec!["rust"]);
    assert!(app.last_updated >= app.created_at);
    Ok(())
}

#[test]
fn users_only_see_their_own_applications() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_db, mut tracker) = open(&dir)?;

    tracker.auth().sign_in("alice@example.com", None)?;
    let alice_app = tracker.create_application(&draft("Acme", ApplicationStatus::Wishlist, None))?;

    tracker.auth().sign_in("bob@example.com", None)?;
    assert!(tracker.applications()?.is_empty());
    assert!(matches!(
        tracker.delete_application(&alice_app.id),
        Err(TrackerError::NotFound(_))
    ));

    tracker.auth().sign_in("alice@example.com", None)?;
    assert_eq!(tracker.applications()?.len(), 1);
    Ok(())
}

#[test]
fn deleting_application_cascades_to_notes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_db, mut tracker) = open(&dir)?;
    tracker.auth().sign_in("alice@example.com", None)?;

    let app = tracker.create_application(&draft("Acme", ApplicationStatus::Interviewing, None))?;
    tracker.add_note(&app.id, "Recruiter call went well")?;
    tracker.add_note(&app.id, "Onsite scheduled")?;
    let contents: Vec<String> = tracker.notes(&app.id)?.iter().map(|n| n.content.clone()).collect();
    assert_eq!(contents, vec!["Onsite scheduled", "Recruiter call went well"]);

    tracker.delete_application(&app.id)?;
    assert!(tracker.notes(&app.id)?.is_empty());
    assert!(tracker.applications()?.is_empty());
    Ok(())
}

#[test]
fn board_orders_dated_cards_and_lists_sort_by_column() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_db, mut tracker) = open(&dir)?;
    tracker.auth().sign_in("alice@example.com", None)?;

    tracker.create_application(&draft("Acme", ApplicationStatus::Applied, Some((2024, 1, 10))))?;
    tracker.create_application(&draft("Globex", ApplicationStatus::Applied, Some((2024, 3, 5))))?;
    tracker.create_application(&draft("Initech", ApplicationStatus::Applied, Some((2024, 2, 1))))?;

    let board = tracker.board(&BoardFilter::default())?;
    let companies: Vec<&str> = board
        .column(ApplicationStatus::Applied)
        .applications
        .iter()
        .map(|a| a.company_name.as_str())
        .collect();
    assert_eq!(companies, vec!["Globex", "Initech", "Acme"]);

    let list = tracker.list(
        &BoardFilter::default(),
        Some(ColumnSort { key: SortKey::Company, ascending: true }),
    )?;
    let companies: Vec<&str> = list.iter().map(|a| a.company_name.as_str()).collect();
    assert_eq!(companies, vec!["Acme", "Globex", "Initech"]);
    Ok(())
}

#[test]
fn sign_out_blocks_writes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (_db, mut tracker) = open(&dir)?;
    tracker.auth().sign_in("alice@example.com", None)?;
    let app = tracker.create_application(&draft("Acme", ApplicationStatus::Wishlist, None))?;

    tracker.auth().sign_out()?;
    assert_eq!(tracker.add_note(&app.id, "hello").err(), Some(TrackerError::Auth));
    assert!(tracker.auth().get_session()?.is_none());
    Ok(())
}
