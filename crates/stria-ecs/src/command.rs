//! Deferred world mutations.
//!
//! Systems run while joins hold their stores, so structural changes to those
//! stores (attach, detach, destroy) are queued in [`Commands`] and applied in
//! FIFO order after every system of the tick has run. A command that fails
//! (duplicate attach, missing component) is logged and counted, never fatal.
//!
//! ```
//! use stria_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Health(u32);
//!
//! let world = World::new();
//! let e = world.create();
//!
//! let mut cmds = Commands::new();
//! cmds.insert(e.id(), Health(100));
//! cmds.insert(e.id(), Health(5));
//!
//! let report = cmds.apply(&world);
//! assert_eq!(report.success_count, 1);
//! assert_eq!(report.failed_count, 1);
//! assert_eq!(*world.get_component::<Health>(e.id()).unwrap(), Health(100));
//! ```

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::entity::{Entity, EntityId};
use crate::world::World;
use crate::EcsError;

type Op = Box<dyn FnOnce(&World) -> Result<(), EcsError>>;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One queued mutation.
struct Command {
    /// Position in the queue, for log correlation.
    index: u32,
    /// What the command does, e.g. `insert` or a custom label.
    label: String,
    /// The entity and component type it touches, when known.
    target: Option<(EntityId, &'static str)>,
    /// Name of the system that queued it.
    issued_by: Option<String>,
    op: Op,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of one [`Commands::apply`] call.
///
/// `conflict_count` counts `(entity, component)` pairs targeted by more than
/// one command in the batch. Conflicts are applied in order and only warned
/// about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ApplyReport {
    /// Number of `(entity, component)` pairs targeted by multiple commands.
    pub conflict_count: usize,
    /// Number of commands that failed to apply.
    pub failed_count: usize,
    /// Number of commands that applied successfully.
    pub success_count: usize,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// FIFO queue of deferred world mutations.
#[derive(Default)]
pub struct Commands {
    commands: Vec<Command>,
    next_index: u32,
    issuer: Option<String>,
    last_apply_report: ApplyReport,
}

impl Commands {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute the commands queued from now on to `system`.
    pub(crate) fn set_issuer(&mut self, system: Option<&str>) {
        self.issuer = system.map(str::to_owned);
    }

    fn push(&mut self, label: &str, target: Option<(EntityId, &'static str)>, op: Op) {
        let index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            index,
            label: label.to_owned(),
            target,
            issued_by: self.issuer.clone(),
            op,
        });
    }

    /// Queue attaching `value` to `id`.
    pub fn insert<T: 'static>(&mut self, id: EntityId, value: T) {
        self.push(
            "insert",
            Some((id, type_name::<T>())),
            Box::new(move |world: &World| world.try_insert_component(id, value)),
        );
    }

    /// Queue detaching the `T` of `id`. The removed value is dropped.
    pub fn remove<T: 'static>(&mut self, id: EntityId) {
        self.push(
            "remove",
            Some((id, type_name::<T>())),
            Box::new(move |world: &World| world.try_remove_component::<T>(id).map(drop)),
        );
    }

    /// Queue destroying the entity owned by `entity`.
    pub fn destroy(&mut self, entity: Entity) {
        self.push(
            "destroy",
            None,
            Box::new(move |world: &World| {
                world.destroy(entity);
                Ok(())
            }),
        );
    }

    /// Queue an arbitrary mutation, e.g. creating an entity and handing its
    /// handle to whoever owns it.
    pub fn custom<F>(&mut self, label: &str, f: F)
    where
        F: FnOnce(&World) + 'static,
    {
        self.push(
            label,
            None,
            Box::new(move |world: &World| {
                f(world);
                Ok(())
            }),
        );
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Report of the most recent [`apply`](Self::apply).
    pub fn last_apply_report(&self) -> ApplyReport {
        self.last_apply_report
    }

    /// Apply every queued command in insertion order and clear the queue.
    ///
    /// Commands queued by a custom command while applying run in the next
    /// batch.
    pub fn apply(&mut self, world: &World) -> ApplyReport {
        let commands = std::mem::take(&mut self.commands);
        self.next_index = 0;

        let mut seen: HashMap<(EntityId, &'static str), Vec<u32>> = HashMap::new();
        for cmd in &commands {
            if let Some(target) = cmd.target {
                seen.entry(target).or_default().push(cmd.index);
            }
        }
        let mut conflict_count = 0;
        for ((entity, component), indices) in &seen {
            if indices.len() > 1 {
                conflict_count += 1;
                warn!(
                    entity = %entity,
                    component = component,
                    command_indices = ?indices,
                    "conflict: {} commands target the same entity+component",
                    indices.len()
                );
            }
        }

        let mut success_count = 0;
        let mut failed_count = 0;
        for cmd in commands {
            let Command {
                index,
                label,
                target,
                issued_by,
                op,
            } = cmd;
            match op(world) {
                Ok(()) => success_count += 1,
                Err(e) => {
                    failed_count += 1;
                    warn!(
                        command_index = index,
                        command = %label,
                        target = ?target.map(|(id, _)| id),
                        system = issued_by.as_deref().unwrap_or("-"),
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }

        self.last_apply_report = ApplyReport {
            conflict_count,
            failed_count,
            success_count,
        };
        self.last_apply_report
    }
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.commands.iter().map(|c| c.label.as_str()).collect();
        f.debug_struct("Commands")
            .field("queued", &labels)
            .field("last_apply_report", &self.last_apply_report)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    struct Hp(i32);

    #[test]
    fn commands_apply_in_fifo_order() {
        let world = World::new();
        let e = world.create();
        let mut cmds = Commands::new();
        cmds.insert(e.id(), Hp(1));
        cmds.remove::<Hp>(e.id());
        cmds.insert(e.id(), Hp(3));
        let report = cmds.apply(&world);
        assert_eq!(report.success_count, 3);
        assert_eq!(report.conflict_count, 1);
        assert_eq!(*world.get_component::<Hp>(e.id()).unwrap(), Hp(3));
        assert!(cmds.is_empty());
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let world = World::new();
        let e = world.create();
        let mut cmds = Commands::new();
        cmds.remove::<Hp>(e.id());
        cmds.insert(e.id(), Hp(2));
        let report = cmds.apply(&world);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.success_count, 1);
        assert_eq!(cmds.last_apply_report(), report);
    }

    #[test]
    fn destroy_drops_the_handle() {
        let world = World::new();
        let e = world.create();
        let id = e.id();
        world.insert_component(id, Hp(1));
        let mut cmds = Commands::new();
        cmds.destroy(e);
        assert_eq!(world.component_count::<Hp>(), 1);
        cmds.apply(&world);
        assert_eq!(world.component_count::<Hp>(), 0);
        assert!(!world.has_component::<Hp>(id));
    }

    #[test]
    fn insert_queued_after_destroy_fails() {
        let world = World::new();
        let e = world.create();
        let id = e.id();
        world.insert_component(id, Hp(1));

        let mut cmds = Commands::new();
        cmds.destroy(e);
        cmds.insert(id, Hp(2));
        let report = cmds.apply(&world);

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(world.component_count::<Hp>(), 0);
        assert_eq!(world.ledger_len(), 0);
        assert!(world.query::<(Hp,)>().entities().is_empty());
    }

    #[test]
    fn custom_commands_can_create_entities() {
        let world = World::new();
        let owned: Rc<RefCell<Vec<Entity>>> = Rc::default();
        let mut cmds = Commands::new();
        let sink = Rc::clone(&owned);
        cmds.custom("spawn", move |world| {
            let e = world.create();
            world.insert_component(e.id(), Hp(7));
            sink.borrow_mut().push(e);
        });
        cmds.apply(&world);
        assert_eq!(owned.borrow().len(), 1);
        assert_eq!(world.component_count::<Hp>(), 1);
    }
}
