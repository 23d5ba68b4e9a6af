// ABOUTME: Startup integrity checks for the command tree
// ABOUTME: Rejects name collisions and children that disagree with their parent

use crate::command::{Command, CommandKind};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("command '{id}' has no usable name")]
    EmptyNames { id: String },

    #[error("command id '{id}' is defined more than once")]
    DuplicateId { id: String },

    #[error("name '{name}' is claimed by both '{first}' and '{second}' under {under}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
        under: String,
    },

    #[error("'{child}' is a {child_kind} command but its parent '{parent}' is {parent_kind}")]
    KindMismatch {
        child: String,
        child_kind: CommandKind,
        parent: String,
        parent_kind: CommandKind,
    },

    #[error("'{child}' is in category '{child_category}' but its parent '{parent}' is in '{parent_category}'")]
    CategoryMismatch {
        child: String,
        child_category: String,
        parent: String,
        parent_category: String,
    },

    #[error("'{child}' declares parent {declared} but sits under {actual}")]
    WrongParent {
        child: String,
        declared: String,
        actual: String,
    },
}

fn describe_parent(parent: Option<&str>) -> String {
    match parent {
        Some(id) => format!("'{}'", id),
        None => "the top level".to_string(),
    }
}

/// Check a full command set. Returns the first violation found, walking
/// depth-first in declaration order.
pub fn validate(commands: &[Command]) -> Result<(), ValidationError> {
    let mut ids = HashSet::new();

    for kind in CommandKind::ALL {
        let top: Vec<&Command> = commands.iter().filter(|c| c.kind == kind).collect();
        check_siblings(&top, &format!("the {} commands", kind))?;
    }

    for command in commands {
        check_node(command, None, &mut ids)?;
    }
    Ok(())
}

fn check_node<'a>(
    command: &'a Command,
    parent: Option<&'a Command>,
    ids: &mut HashSet<&'a str>,
) -> Result<(), ValidationError> {
    if !ids.insert(command.id) {
        return Err(ValidationError::DuplicateId {
            id: command.id.to_string(),
        });
    }

    if command.names.is_empty() || command.names.iter().any(|n| n.trim().is_empty()) {
        return Err(ValidationError::EmptyNames {
            id: command.id.to_string(),
        });
    }

    let actual = parent.map(|p| p.id);
    if command.parent != actual {
        return Err(ValidationError::WrongParent {
            child: command.id.to_string(),
            declared: describe_parent(command.parent),
            actual: describe_parent(actual),
        });
    }

    if let Some(parent) = parent {
        if command.kind != parent.kind {
            return Err(ValidationError::KindMismatch {
                child: command.id.to_string(),
                child_kind: command.kind,
                parent: parent.id.to_string(),
                parent_kind: parent.kind,
            });
        }
        if command.category != parent.category {
            return Err(ValidationError::CategoryMismatch {
                child: command.id.to_string(),
                child_category: command.category.to_string(),
                parent: parent.id.to_string(),
                parent_category: parent.category.to_string(),
            });
        }
    }

    let children: Vec<&Command> = command.children.iter().collect();
    check_siblings(&children, &format!("'{}'", command.id))?;

    for child in &command.children {
        check_node(child, Some(command), ids)?;
    }
    Ok(())
}

fn check_siblings(siblings: &[&Command], under: &str) -> Result<(), ValidationError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for sibling in siblings {
        for name in &sibling.names {
            if let Some(first) = owners.insert(*name, sibling.id) {
                // The same command listing a name twice is harmless
                if first != sibling.id {
                    return Err(ValidationError::NameCollision {
                        name: name.to_string(),
                        first: first.to_string(),
                        second: sibling.id.to_string(),
                        under: under.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind::{Advanced, Normal};

    fn cmd(id: &'static str, kind: CommandKind, names: &[&'static str]) -> Command {
        Command::group(id, kind, "general").names(names)
    }

    #[test]
    fn test_accepts_well_formed_tree() {
        let commands = vec![
            cmd("nick", Advanced, &["nick"])
                .child(cmd("nick.show", Advanced, &["show"]).parent("nick"))
                .child(cmd("nick.set", Advanced, &["set"]).parent("nick")),
            // Same name under a different kind is fine
            cmd("nick.normal", Normal, &["nick"]),
        ];
        assert_eq!(validate(&commands), Ok(()));
    }

    #[test]
    fn test_rejects_top_level_collision_within_kind() {
        let commands = vec![
            cmd("a", Normal, &["ping", "p"]),
            cmd("b", Normal, &["pong", "p"]),
        ];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::NameCollision { name, .. }) if name == "p"
        ));
    }

    #[test]
    fn test_rejects_sibling_collision() {
        let commands = vec![cmd("x", Advanced, &["x"])
            .child(cmd("x.a", Advanced, &["go"]).parent("x"))
            .child(cmd("x.b", Advanced, &["go"]).parent("x"))];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::NameCollision { .. })
        ));
    }

    #[test]
    fn test_rejects_kind_mismatch() {
        let commands =
            vec![cmd("x", Advanced, &["x"]).child(cmd("x.a", Normal, &["a"]).parent("x"))];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::KindMismatch { child, .. }) if child == "x.a"
        ));
    }

    #[test]
    fn test_rejects_category_mismatch() {
        let commands = vec![cmd("x", Advanced, &["x"]).child(
            Command::group("x.a", Advanced, "moderation")
                .names(&["a"])
                .parent("x"),
        )];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_parent() {
        let commands =
            vec![cmd("x", Advanced, &["x"]).child(cmd("x.a", Advanced, &["a"]).parent("y"))];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::WrongParent { .. })
        ));

        // Missing declaration is also wrong
        let commands = vec![cmd("x", Advanced, &["x"]).child(cmd("x.a", Advanced, &["a"]))];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::WrongParent { .. })
        ));

        // Top-level commands must not declare one
        let commands = vec![cmd("x", Advanced, &["x"]).parent("nick")];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::WrongParent { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids_and_empty_names() {
        let commands = vec![cmd("x", Normal, &["x"]), cmd("x", Advanced, &["y"])];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::DuplicateId { .. })
        ));

        let commands = vec![cmd("x", Normal, &[])];
        assert!(matches!(
            validate(&commands),
            Err(ValidationError::EmptyNames { .. })
        ));
    }

    #[test]
    fn test_error_messages_name_both_sides() {
        let commands =
            vec![cmd("x", Advanced, &["x"]).child(cmd("x.a", Normal, &["a"]).parent("x"))];
        let err = validate(&commands).unwrap_err().to_string();
        assert!(err.contains("x.a"));
        assert!(err.contains("advanced"));
    }
}
