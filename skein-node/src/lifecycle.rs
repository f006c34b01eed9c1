use skein_types::error::{SkeinError, SkeinResult};
use tracing::debug;

use crate::node::Node;

/// Close protocol implemented by every node subtype.
///
/// Owners call [`Lifecycle::close`] explicitly before the last handle goes
/// away; dropping an unclosed node trips an assertion in [`Node`]'s `Drop`.
pub trait Lifecycle {
    fn node(&self) -> &Node;

    fn node_mut(&mut self) -> &mut Node;

    /// Subtype teardown. Runs exactly once, while the node is `Closing`.
    fn close_body(&mut self);

    /// Close the node: `Open -> Closing -> (teardown) -> Shut`.
    ///
    /// A node that is already shut or dead is left alone. Closing a node
    /// from inside its own teardown is a re-entrancy bug and reports
    /// `InvalidState` instead of running teardown twice.
    fn close(&mut self) -> SkeinResult<()> {
        let node = self.node();
        if node.is_shut() {
            return Ok(());
        }
        if node.is_closing() {
            return Err(SkeinError::InvalidState {
                access: node.access(),
                operation: "close",
            });
        }

        self.node_mut().mark_closing();
        self.close_body();
        self.node_mut().mark_shut();
        debug!(kind = %self.node().derived(), "node closed");
        Ok(())
    }
}

/// A bare node with no subtype payload.
impl Lifecycle for Node {
    fn node(&self) -> &Node {
        self
    }

    fn node_mut(&mut self) -> &mut Node {
        self
    }

    fn close_body(&mut self) {}
}
