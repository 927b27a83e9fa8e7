//! Switch recognition
//!
//! Cases are visited from the head in appearance order, so a case that falls
//! through has already arrived at the next case when the head visits it and
//! the next case is structured as its own arm. Jumps to the switch follow
//! become `break`. A switch expression is structured the same way but is
//! rendered where its `Switch` operand appears.

use super::recognizer::{Arrival, StructureRecognizer};
use super::{BreakableKind, Structure, StructureId, SwitchArm};
use crate::cfg::{BreakableId, NodeId, SwitchId, SwitchRecord};
use crate::error::{Error, Result};

impl StructureRecognizer<'_> {
    pub(super) fn analyze_switch(&mut self, head: NodeId, switch: SwitchId) -> Result<StructureId> {
        let record = self.body.switch(switch).clone();
        let selector = self.body.graph.node_mut(head).stack.pop().ok_or_else(|| {
            Error::structural(format!("{}: switch at {} has no selector", self.body.signature, head))
        })?;
        let follow = record.follow(self.graph());
        let really_default = record.is_really_default_node(self.graph());
        let exit = if record.expression { None } else { follow };
        let breakable = self.open_breakable(BreakableKind::Switch, head, head, exit, None);

        self.active.push(breakable);
        let arms = self.switch_arms(head, breakable, &record, follow, really_default);
        self.active.pop();
        let (cases, default) = arms?;

        let follow = self.process(head, follow, Arrival::Edge)?;
        log::trace!(
            "switch at {} with {} cases{}",
            head,
            cases.len(),
            if record.expression { " as expression" } else { "" }
        );
        let switch = self.push(Structure::Switch {
            node: head,
            breakable,
            selector,
            cases,
            default,
            expression: record.expression,
            follow,
        });
        if self.graph().node(head).is_empty() {
            Ok(switch)
        } else {
            Ok(self.fragment(head, switch))
        }
    }

    /// Case arms in appearance order, then the `default:` arm
    fn switch_arms(
        &mut self,
        head: NodeId,
        breakable: BreakableId,
        record: &SwitchRecord,
        follow: Option<NodeId>,
        really_default: bool,
    ) -> Result<(Vec<SwitchArm>, Option<StructureId>)> {
        let cases = record.cases(self.graph());
        let mut arms = Vec::with_capacity(cases.len());
        for (node, keys) in cases {
            let body = if Some(node) == follow {
                self.record_arrival(head, node, Arrival::Edge);
                self.push(Structure::Break {
                    breakable,
                    labeled: false,
                })
            } else {
                self.process(head, Some(node), Arrival::Edge)?
            };
            arms.push(SwitchArm { keys, body });
        }
        let default = if really_default {
            Some(self.process(head, Some(record.default), Arrival::Edge)?)
        } else {
            None
        };
        Ok((arms, default))
    }
}
