//! The durable row store the tracker reads from and writes to.
//!
//! Every call is scoped by the owning user's id. Implementations see only
//! normalized values: absent optional fields are `None`, never empty strings.

use std::rc::Rc;

use crate::error::Result;
use crate::models::{Application, ApplicationPatch, Note};

pub trait RemoteStore {
    /// Applications owned by `owner`, newest `created_at` first.
    fn select_applications(&self, owner: &str) -> Result<Vec<Application>>;

    fn insert_application(&self, row: &Application) -> Result<()>;

    /// Overwrites the selected fields and stamps `last_updated`.
    /// Fails with `NotFound` when no row owned by `owner` has this id.
    fn update_application(&self, owner: &str, id: &str, patch: &ApplicationPatch) -> Result<()>;

    /// Removes the application and, by cascade, its notes.
    fn delete_application(&self, owner: &str, id: &str) -> Result<()>;

    /// Notes of one application, newest first.
    fn select_notes(&self, owner: &str, application_id: &str) -> Result<Vec<Note>>;

    fn insert_note(&self, owner: &str, note: &Note) -> Result<()>;

    fn delete_note(&self, owner: &str, note_id: &str) -> Result<()>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Rc<T> {
    fn select_applications(&self, owner: &str) -> Result<Vec<Application>> {
        (**self).select_applications(owner)
    }

    fn insert_application(&self, row: &Application) -> Result<()> {
        (**self).insert_application(row)
    }

    fn update_application(&self, owner: &str, id: &str, patch: &ApplicationPatch) -> Result<()> {
        (**self).update_application(owner, id, patch)
    }

    fn delete_application(&self, owner: &str, id: &str) -> Result<()> {
        (**self).delete_application(owner, id)
    }

    fn select_notes(&self, owner: &str, application_id: &str) -> Result<Vec<Note>> {
        (**self).select_notes(owner, application_id)
    }

    fn insert_note(&self, owner: &str, note: &Note) -> Result<()> {
        (**self).insert_note(owner, note)
    }

    fn delete_note(&self, owner: &str, note_id: &str) -> Result<()> {
        (**self).delete_note(owner, note_id)
    }
}
