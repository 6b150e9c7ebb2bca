//! Roster management: classes and students.

use anyhow::{Context, Result};

use cm_core::ClassId;
use cm_db::Database;

/// Creates a class with a freshly generated invite code.
pub fn create_class(db: &Database, name: &str) -> Result<()> {
    let invite_code = generate_invite_code();
    let class = db
        .create_class(name, &invite_code)
        .context("failed to create class")?;
    println!(
        "Created class {} ({}) with invite code {}",
        class.id, class.name, class.invite_code
    );
    Ok(())
}

/// Adds a student to a class roster.
pub fn add_student(
    db: &Database,
    class: i64,
    name: &str,
    number: Option<i32>,
    device: Option<&str>,
) -> Result<()> {
    let student = db
        .add_student(ClassId::new(class), name, number, device)
        .context("failed to add student")?;
    println!("Added student {} ({})", student.id, student.name);
    Ok(())
}

/// Admits a student into the class behind an invite code.
pub fn join(
    db: &Database,
    code: &str,
    name: &str,
    number: Option<i32>,
    device: Option<&str>,
) -> Result<()> {
    let Some(class) = db
        .find_class_by_invite(code)
        .context("failed to look up invite code")?
    else {
        anyhow::bail!("no class matches invite code {code}");
    };
    let student = db
        .add_student(class.id, name, number, device)
        .context("failed to add student")?;
    println!(
        "Added student {} ({}) to class {} ({})",
        student.id, student.name, class.id, class.name
    );
    Ok(())
}

/// Lists a class roster.
pub fn list(db: &Database, class: i64) -> Result<()> {
    let students = db
        .list_students(ClassId::new(class))
        .context("failed to list students")?;
    if students.is_empty() {
        println!("No students in class {class}.");
        return Ok(());
    }
    for student in students {
        let number = student
            .student_number
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "{}  #{}  {}  level {} ({} XP)",
            student.id, number, student.name, student.current_level, student.current_xp
        );
    }
    Ok(())
}

/// Six characters from a v4 UUID, uppercased; matches what students type
/// when joining a class.
fn generate_invite_code() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..6].to_uppercase()
}
