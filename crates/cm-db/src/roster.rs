//! Roster persistence and the directory implementation.
//!
//! Classes and students live in the same schema as the event log; this
//! module is the default stand-in for the external directory collaborator.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use cm_core::directory::{Directory, SessionInfo};
use cm_core::{ClassId, Participant, ParticipantId, ServiceError, SessionId};

use crate::{Database, DbError, format_timestamp, parse_timestamp};

/// A class group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub id: ClassId,
    pub name: String,
    /// Code students use to join the class.
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}

/// A student row, including gamification state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: ParticipantId,
    pub class_id: Option<ClassId>,
    pub name: String,
    pub student_number: Option<i32>,
    pub device_uuid: Option<String>,
    pub current_xp: i64,
    pub current_level: i32,
}

impl StudentRecord {
    #[must_use]
    pub fn participant(&self) -> Participant {
        Participant {
            id: self.id,
            name: self.name.clone(),
            number: self.student_number,
        }
    }
}

fn read_student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: ParticipantId::new(row.get(0)?),
        class_id: row.get::<_, Option<i64>>(1)?.map(ClassId::new),
        name: row.get(2)?,
        student_number: row.get(3)?,
        device_uuid: row.get(4)?,
        current_xp: row.get(5)?,
        current_level: row.get(6)?,
    })
}

const STUDENT_COLUMNS: &str =
    "id, class_id, name, student_number, device_uuid, current_xp, current_level";

impl Database {
    /// Creates a class with its invite code.
    pub fn create_class(&self, name: &str, invite_code: &str) -> Result<ClassRecord, DbError> {
        let created_at = Utc::now();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO classes (name, invite_code, created_at) VALUES (?, ?, ?)",
            params![name, invite_code, format_timestamp(created_at)],
        )?;
        Ok(ClassRecord {
            id: ClassId::new(conn.last_insert_rowid()),
            name: name.to_string(),
            invite_code: invite_code.to_string(),
            created_at,
        })
    }

    /// Looks up a class by its invite code, for student admission.
    pub fn find_class_by_invite(&self, invite_code: &str) -> Result<Option<ClassRecord>, DbError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, name, invite_code, created_at FROM classes WHERE invite_code = ?",
                params![invite_code],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, name, invite_code, created_at)| {
            Ok(ClassRecord {
                id: ClassId::new(id),
                name,
                invite_code,
                created_at: parse_timestamp(&created_at, "created_at")?,
            })
        })
        .transpose()
    }

    fn class_exists(&self, class: ClassId) -> Result<bool, DbError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM classes WHERE id = ?",
            params![class.value()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Adds a student to a class roster.
    pub fn add_student(
        &self,
        class: ClassId,
        name: &str,
        student_number: Option<i32>,
        device_uuid: Option<&str>,
    ) -> Result<StudentRecord, DbError> {
        let conn = self.lock();
        conn.execute(
            "
            INSERT INTO students (class_id, name, student_number, device_uuid, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                class.value(),
                name,
                student_number,
                device_uuid,
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(StudentRecord {
            id: ParticipantId::new(conn.last_insert_rowid()),
            class_id: Some(class),
            name: name.to_string(),
            student_number,
            device_uuid: device_uuid.map(str::to_string),
            current_xp: 0,
            current_level: 1,
        })
    }

    /// One student by ID.
    pub fn get_student(&self, id: ParticipantId) -> Result<Option<StudentRecord>, DbError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
                params![id.value()],
                read_student_row,
            )
            .optional()?;
        Ok(row)
    }

    /// The class roster, ordered by student number then ID.
    pub fn list_students(&self, class: ClassId) -> Result<Vec<StudentRecord>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {STUDENT_COLUMNS}
            FROM students
            WHERE class_id = ?
            ORDER BY student_number ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(params![class.value()], read_student_row)?;
        let mut students = Vec::new();
        for row in rows {
            students.push(row?);
        }
        Ok(students)
    }
}

impl Directory for Database {
    fn resolve_participant(&self, id: ParticipantId) -> Result<Participant, ServiceError> {
        self.get_student(id)?
            .map(|s| s.participant())
            .ok_or_else(|| ServiceError::not_found("participant", id))
    }

    fn list_participants_for_class(
        &self,
        class: ClassId,
    ) -> Result<Vec<Participant>, ServiceError> {
        Ok(self
            .list_students(class)?
            .iter()
            .map(StudentRecord::participant)
            .collect())
    }

    fn resolve_session(&self, session: SessionId) -> Result<SessionInfo, ServiceError> {
        // A session exists implicitly for as long as its class does; the
        // session identifier is the owning class's.
        let class = ClassId::new(session.value());
        if self.class_exists(class)? {
            Ok(SessionInfo { class_id: class })
        } else {
            Err(ServiceError::not_found("session", session))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_and_students_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let class = db.create_class("3-2", "ABC123").unwrap();
        db.add_student(class.id, "Jun", Some(11), None).unwrap();
        db.add_student(class.id, "Mina", Some(4), Some("device-1")).unwrap();

        let students = db.list_students(class.id).unwrap();
        assert_eq!(students.len(), 2);
        // Ordered by student number.
        assert_eq!(students[0].name, "Mina");
        assert_eq!(students[1].name, "Jun");
        assert_eq!(students[0].current_xp, 0);
        assert_eq!(students[0].current_level, 1);
    }

    #[test]
    fn invite_codes_resolve_and_must_be_unique() {
        let db = Database::open_in_memory().unwrap();
        let class = db.create_class("3-2", "ABC123").unwrap();

        let found = db.find_class_by_invite("ABC123").unwrap().unwrap();
        assert_eq!(found.id, class.id);
        assert!(db.find_class_by_invite("NOPE").unwrap().is_none());
        assert!(db.create_class("4-1", "ABC123").is_err());
    }

    #[test]
    fn directory_resolves_participants() {
        let db = Database::open_in_memory().unwrap();
        let class = db.create_class("3-2", "ABC123").unwrap();
        let student = db.add_student(class.id, "Mina", Some(4), None).unwrap();

        let participant = db.resolve_participant(student.id).unwrap();
        assert_eq!(participant.name, "Mina");
        assert_eq!(participant.number, Some(4));

        assert!(matches!(
            db.resolve_participant(ParticipantId::new(99)),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn sessions_resolve_through_their_class() {
        let db = Database::open_in_memory().unwrap();
        let class = db.create_class("3-2", "ABC123").unwrap();

        let info = db.resolve_session(SessionId::new(class.id.value())).unwrap();
        assert_eq!(info.class_id, class.id);
        assert!(matches!(
            db.resolve_session(SessionId::new(999)),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn empty_class_roster_lists_empty() {
        let db = Database::open_in_memory().unwrap();
        let class = db.create_class("3-2", "ABC123").unwrap();
        assert!(db.list_participants_for_class(class.id).unwrap().is_empty());
    }
}
