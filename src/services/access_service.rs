use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::quiz::Quiz;

/// Who is calling. Identity itself is resolved upstream (gateway);
/// this subsystem only consumes the id and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Instructor,
    Learner,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "instructor" => Some(Role::Instructor),
            "learner" => Some(Role::Learner),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Instructor)
    }
}

/// Authorization collaborator consumed by quiz management and manual
/// grading. The engine never decides *who* may manage, it only asks.
#[cfg_attr(test, mockall::automock)]
pub trait ManageAccess: Send + Sync {
    fn can_manage(&self, actor: &Actor, quiz: &Quiz) -> bool;
}

/// Default policy: admins manage everything, instructors manage the
/// quizzes they created.
pub struct RoleAccess;

impl ManageAccess for RoleAccess {
    fn can_manage(&self, actor: &Actor, quiz: &Quiz) -> bool {
        match actor.role {
            Role::Admin => true,
            Role::Instructor => quiz.created_by == actor.id,
            Role::Learner => false,
        }
    }
}
