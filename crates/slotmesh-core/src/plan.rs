//! Slot plan generation for a collection tree
//!
//! The sink sits at the root. Slots are handed out depth-first so that data
//! flows up the tree within a single period:
//! - a parent listens for as many slots as it has children, then holds one
//!   listen-ack slot
//! - each child sends in its own slot of that listen window and listens for
//!   the acknowledgment in the parent's listen-ack slot
//! - subtrees are planned before their parent, so a relay has collected its
//!   children's data before it sends upstream
//!
//! ```text
//! 006:  S   s
//! 028: LLLLl S    s
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::{ConfigError, NodeId, RoleAssignment, ScheduleConfig, ScheduleLayout, SlotLayout};

/// Node of the collection tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanNode {
    pub id: NodeId,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn leaf(id: u16) -> Self {
        PlanNode {
            id: NodeId::new(id),
            children: Vec::new(),
        }
    }

    pub fn with_children(id: u16, children: Vec<PlanNode>) -> Self {
        PlanNode {
            id: NodeId::new(id),
            children,
        }
    }

    pub fn add_child(&mut self, child: PlanNode) {
        self.children.push(child);
    }
}

/// Slot indices assigned to one node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotAssignment {
    pub parent: Option<NodeId>,
    pub listen: Option<u16>,
    pub listen_ack: Option<u16>,
    pub send: Option<u16>,
    pub send_ack: Option<u16>,
}

/// Computed slot plan for a whole tree
#[derive(Clone, Debug)]
pub struct SlotPlan {
    root: NodeId,
    /// Node ids in planning order (children before parents)
    order: Vec<NodeId>,
    assignments: BTreeMap<NodeId, SlotAssignment>,
    relays: BTreeSet<NodeId>,
    length: u16,
}

impl SlotPlan {
    /// Plan slots for the tree rooted at the sink
    pub fn compute(root: &PlanNode) -> Result<Self, ConfigError> {
        let mut plan = SlotPlan {
            root: root.id,
            order: Vec::new(),
            assignments: BTreeMap::new(),
            relays: BTreeSet::new(),
            length: 0,
        };
        plan.length = plan.assign(root, None, 0)?;
        Ok(plan)
    }

    fn assign(
        &mut self,
        node: &PlanNode,
        parent: Option<NodeId>,
        mut offset: u16,
    ) -> Result<u16, ConfigError> {
        if self.assignments.contains_key(&node.id) {
            return Err(ConfigError::InvalidPlan(format!(
                "node {} appears twice",
                node.id
            )));
        }
        self.assignments.insert(
            node.id,
            SlotAssignment {
                parent,
                ..Default::default()
            },
        );

        for child in &node.children {
            offset = self.assign(child, Some(node.id), offset)?;
        }
        self.order.push(node.id);

        if node.children.is_empty() {
            return Ok(offset);
        }

        let listen_ack = u16::try_from(node.children.len())
            .ok()
            .and_then(|n| offset.checked_add(n))
            .ok_or_else(|| Self::too_many_slots(node.id))?;
        for (idx, child) in node.children.iter().enumerate() {
            if let Some(slots) = self.assignments.get_mut(&child.id) {
                slots.send = Some(offset + idx as u16);
                slots.send_ack = Some(listen_ack);
            }
        }
        if let Some(slots) = self.assignments.get_mut(&node.id) {
            slots.listen = Some(offset);
            slots.listen_ack = Some(listen_ack);
        }
        if parent.is_some() {
            self.relays.insert(node.id);
        }

        listen_ack
            .checked_add(1)
            .ok_or_else(|| Self::too_many_slots(node.id))
    }

    fn too_many_slots(id: NodeId) -> ConfigError {
        ConfigError::InvalidPlan(format!("slot count overflows at node {id}"))
    }

    /// Sink at the root of the tree
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of slots one period must hold
    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn assignment(&self, id: NodeId) -> Option<&SlotAssignment> {
        self.assignments.get(&id)
    }

    /// Interior nodes other than the sink
    pub fn relays(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.relays.iter().copied()
    }

    /// Relay set plus the sink
    pub fn roles(&self) -> RoleAssignment {
        RoleAssignment::new()
            .with_relays(self.relays())
            .with_sinks([self.root])
    }

    /// Slot layouts in planning order
    pub fn layouts(&self, period: Duration, slot_size: Duration) -> Vec<SlotLayout> {
        self.order
            .iter()
            .filter_map(|id| self.assignments.get(id).map(|a| (*id, a)))
            .map(|(id, a)| SlotLayout {
                device_id: id,
                sendto: a.parent,
                period,
                slot_size,
                listen: a.listen,
                listen_ack: a.listen_ack,
                send: a.send,
                send_ack: a.send_ack,
            })
            .collect()
    }

    /// Validated schedules for every node
    pub fn schedules(
        &self,
        period: Duration,
        slot_size: Duration,
    ) -> Result<BTreeMap<NodeId, ScheduleConfig>, ConfigError> {
        if slot_size * self.length as u32 >= period {
            return Err(ConfigError::InvalidPlan(format!(
                "{} slots of {:?} do not fit in {:?}",
                self.length, slot_size, period
            )));
        }
        self.layouts(period, slot_size)
            .iter()
            .map(|layout| Ok((layout.device_id(), layout.to_schedule()?)))
            .collect()
    }

    /// One chart line per node: `L` listen, `l` listen-ack, `S` send,
    /// `s` send-ack
    pub fn render(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| self.assignments.get(id).map(|a| (*id, a)))
            .map(|(id, a)| {
                let mut line = format!("{:03}: ", id.0);
                for i in 0..self.length {
                    let c = match (a.listen, a.listen_ack) {
                        (Some(l), Some(la)) if i >= l && i < la => 'L',
                        (_, Some(la)) if i == la => 'l',
                        _ if a.send == Some(i) => 'S',
                        _ if a.send_ack == Some(i) => 's',
                        _ => ' ',
                    };
                    line.push(c);
                }
                line
            })
            .collect()
    }
}
