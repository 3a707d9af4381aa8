// src/services/visibility.rs

use std::collections::HashSet;

use crate::models::quiz::Visibility;

/// The identity making a request: the user id plus the ids of every group
/// the user belongs to, resolved by the caller before any policy check.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub id: i64,
    pub group_ids: HashSet<i64>,
}

impl Viewer {
    pub fn new(id: i64, group_ids: impl IntoIterator<Item = i64>) -> Self {
        Viewer {
            id,
            group_ids: group_ids.into_iter().collect(),
        }
    }
}

/// Anything the visibility rules can be asked about: full aggregates and
/// index summaries both answer with their flag, owner and shared groups.
pub trait QuizAccess {
    fn visibility(&self) -> Visibility;
    fn owner_id(&self) -> Option<i64>;
    fn authorized_group_ids(&self) -> &[i64];
}

/// Whether `viewer` may see and attempt the quiz.
///
/// Public quizzes are visible to everyone, including anonymous viewers.
/// Private quizzes are visible to their owner and to members of any group
/// the quiz is shared with.
pub fn is_visible<Q: QuizAccess>(quiz: &Q, viewer: Option<&Viewer>) -> bool {
    match quiz.visibility() {
        Visibility::Public => true,
        Visibility::Private => {
            let Some(viewer) = viewer else {
                return false;
            };
            if quiz.owner_id() == Some(viewer.id) {
                return true;
            }
            quiz.authorized_group_ids()
                .iter()
                .any(|group_id| viewer.group_ids.contains(group_id))
        }
    }
}

/// Keeps only the quizzes `viewer` may see, preserving order.
pub fn filter_visible<Q: QuizAccess>(quizzes: Vec<Q>, viewer: Option<&Viewer>) -> Vec<Q> {
    quizzes
        .into_iter()
        .filter(|quiz| is_visible(quiz, viewer))
        .collect()
}

/// Whether `viewer` may edit, delete or share the quiz. Management rights
/// belong to the owner alone; group members can view but not manage.
pub fn can_manage<Q: QuizAccess>(quiz: &Q, viewer: Option<&Viewer>) -> bool {
    match viewer {
        Some(viewer) => quiz.owner_id() == Some(viewer.id),
        None => false,
    }
}
