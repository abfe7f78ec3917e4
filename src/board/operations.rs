use crate::model::{
    BoardKind, ContainerOperation, ItemOperation, Partition, PartitionKey, PartitionKeyId,
    Priority, WorkItem,
};

/// Which operations a board kind renders on its cards and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSwitch {
    pub kind: BoardKind,
    pub move_to: bool,
    pub drag: bool,
    pub change_page: bool,
}

impl OperationSwitch {
    pub fn for_kind(kind: BoardKind) -> Self {
        let movable = !matches!(kind, BoardKind::Deadline);
        Self {
            kind,
            move_to: movable,
            drag: movable,
            change_page: true,
        }
    }

    /// Operations for a card sitting in column `key`.
    pub fn item_operations(&self, item: &WorkItem, key: &PartitionKey) -> Vec<ItemOperation> {
        match self.kind {
            BoardKind::Status => self.status_operations(item),
            BoardKind::Priority => {
                let current = match &key.partition {
                    Partition::Priority { priority } => Some(*priority),
                    _ => item.priority,
                };
                self.priority_operations(current)
            }
            BoardKind::Deadline => vec![],
        }
    }

    pub fn container_operations(&self, key: &PartitionKey) -> Vec<ContainerOperation> {
        if !self.change_page {
            return vec![];
        }
        vec![ContainerOperation::ChangePageNo {
            kanban_key: key.id.clone(),
        }]
    }

    // Permission flags come from the source; nothing is re-derived here.
    fn status_operations(&self, item: &WorkItem) -> Vec<ItemOperation> {
        let mut ops = Vec::new();
        if self.move_to {
            ops.extend(item.transitions.iter().map(|t| ItemOperation::MoveTo {
                target: PartitionKeyId::from(t.state_id.as_str()),
                text: format!("Move to {}", t.state_name),
                disabled: !t.permission,
            }));
        }
        if self.drag {
            let targets = item.allowed_targets();
            ops.push(ItemOperation::Drag {
                disabled: targets.is_empty(),
                targets,
            });
        }
        ops
    }

    fn priority_operations(&self, current: Option<Priority>) -> Vec<ItemOperation> {
        let mut ops = Vec::new();
        if self.move_to {
            ops.extend(Priority::ALL.into_iter().map(|p| ItemOperation::MoveTo {
                target: PartitionKeyId::from(p.as_str()),
                text: format!("Move to {}", p.display_name()),
                disabled: Some(p) == current,
            }));
        }
        if self.drag {
            let targets: Vec<PartitionKeyId> = Priority::ALL
                .into_iter()
                .filter(|p| Some(*p) != current)
                .map(|p| PartitionKeyId::from(p.as_str()))
                .collect();
            ops.push(ItemOperation::Drag {
                disabled: targets.is_empty(),
                targets,
            });
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExpireType, TransitionButton};

    fn item_with(transitions: Vec<TransitionButton>) -> WorkItem {
        let mut item: WorkItem =
            serde_json::from_str(r#"{"id":"7","title":"Ship it","priority":"HIGH"}"#).unwrap();
        item.transitions = transitions;
        item
    }

    fn button(id: &str, name: &str, permission: bool) -> TransitionButton {
        TransitionButton {
            state_id: id.into(),
            state_name: name.into(),
            state_belong: None,
            permission,
        }
    }

    #[test]
    fn status_board_disables_unpermitted_moves() {
        let switch = OperationSwitch::for_kind(BoardKind::Status);
        let item = item_with(vec![button("2", "Doing", true), button("3", "Done", false)]);
        let ops = switch.item_operations(&item, &PartitionKey::state("1", "Open"));

        assert_eq!(
            ops,
            vec![
                ItemOperation::MoveTo {
                    target: "2".into(),
                    text: "Move to Doing".into(),
                    disabled: false,
                },
                ItemOperation::MoveTo {
                    target: "3".into(),
                    text: "Move to Done".into(),
                    disabled: true,
                },
                ItemOperation::Drag {
                    targets: vec!["2".into()],
                    disabled: false,
                },
            ]
        );
    }

    #[test]
    fn priority_board_excludes_current_priority_from_drag() {
        let switch = OperationSwitch::for_kind(BoardKind::Priority);
        let item = item_with(vec![]);
        let ops = switch.item_operations(&item, &PartitionKey::priority(Priority::High));

        let disabled: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                ItemOperation::MoveTo {
                    target, disabled: true, ..
                } => Some(target.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(disabled, vec!["HIGH"]);

        let drag = ops.last().unwrap();
        assert_eq!(
            drag,
            &ItemOperation::Drag {
                targets: vec!["URGENT".into(), "NORMAL".into(), "LOW".into()],
                disabled: false,
            }
        );
    }

    #[test]
    fn deadline_board_has_no_item_operations() {
        let switch = OperationSwitch::for_kind(BoardKind::Deadline);
        let item = item_with(vec![button("2", "Doing", true)]);
        let key = PartitionKey::deadline(ExpireType::Expired, 86_400);
        assert!(switch.item_operations(&item, &key).is_empty());
        assert_eq!(
            switch.container_operations(&key),
            vec![ContainerOperation::ChangePageNo {
                kanban_key: "Expired".into()
            }]
        );
    }
}
