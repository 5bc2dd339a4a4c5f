use std::sync::{Arc, Mutex};

use super::{BlockingScope, ForegroundSurface};
use crate::util::lock;

/// Arming state of an [`InputBlocker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerPhase {
    Unarmed,
    Blocked,
    Released,
}

struct BlockerState {
    phase: BlockerPhase,
    // elements resolved at block time; unblock releases exactly these
    elements: Vec<String>,
}

/// Scoped input block owned by a single task.
///
/// `block()` acts only from `Unarmed` and `unblock()` only from `Blocked`.
/// Any other call is a no-op: completion can legitimately race the block
/// request. An `unblock()` seen before `block()` retires the blocker, so the
/// late `block()` does nothing.
///
/// The engine always invokes both methods on the foreground coordinator.
pub struct InputBlocker {
    scope: BlockingScope,
    target: Option<String>,
    surface: Arc<dyn ForegroundSurface>,
    state: Mutex<BlockerState>,
}

impl InputBlocker {
    pub fn new(
        scope: BlockingScope,
        target: Option<String>,
        surface: Arc<dyn ForegroundSurface>,
    ) -> Self {
        Self {
            scope,
            target,
            surface,
            state: Mutex::new(BlockerState {
                phase: BlockerPhase::Unarmed,
                elements: Vec::new(),
            }),
        }
    }

    pub fn scope(&self) -> BlockingScope {
        self.scope
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn phase(&self) -> BlockerPhase {
        lock(&self.state).phase
    }

    /// Elements blocked by the last `block()`; empty before it runs.
    pub fn blocked_elements(&self) -> Vec<String> {
        lock(&self.state).elements.clone()
    }

    /// Returns whether this call changed the surface.
    pub fn block(&self) -> bool {
        let elements = {
            let mut state = lock(&self.state);
            if state.phase != BlockerPhase::Unarmed {
                tracing::trace!(scope = %self.scope, phase = ?state.phase, "block ignored");
                return false;
            }
            state.phase = BlockerPhase::Blocked;
            state.elements = self.surface.resolve(self.scope, self.target.as_deref());
            state.elements.clone()
        };
        self.surface.set_blocked(self.scope, &elements, true);
        true
    }

    /// Returns whether this call changed the surface.
    pub fn unblock(&self) -> bool {
        let elements = {
            let mut state = lock(&self.state);
            match state.phase {
                BlockerPhase::Blocked => {
                    state.phase = BlockerPhase::Released;
                    std::mem::take(&mut state.elements)
                }
                BlockerPhase::Unarmed => {
                    state.phase = BlockerPhase::Released;
                    tracing::trace!(scope = %self.scope, "unblock before block, blocker retired");
                    return false;
                }
                BlockerPhase::Released => return false,
            }
        };
        self.surface.set_blocked(self.scope, &elements, false);
        true
    }
}

impl std::fmt::Debug for InputBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBlocker")
            .field("scope", &self.scope)
            .field("target", &self.target)
            .field("phase", &self.phase())
            .finish()
    }
}
