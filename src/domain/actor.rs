//! Attribution of changes to an actor.
//!
//! An [`ActorContext`] belongs to one logical operation and is passed to the
//! recorder explicitly. [`ActorContext::with_actor`] returns a scope guard;
//! when the guard drops the context is cleared to "no actor". It does not
//! restore whatever an enclosing scope had set, so after a nested scope ends
//! the outer scope records unattributed changes.

use {
    super::id::ActorId,
    std::ops::{Deref, DerefMut},
};

#[derive(Debug, Default, Clone)]
pub struct ActorContext {
    current: Option<ActorId>,
}

impl ActorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ActorId> {
        self.current
    }

    pub fn with_actor(&mut self, actor: ActorId) -> ActorScope<'_> {
        self.current = Some(actor);
        ActorScope { ctx: self }
    }
}

/// Guard returned by [`ActorContext::with_actor`]. Clears the actor on drop.
#[derive(Debug)]
pub struct ActorScope<'a> {
    ctx: &'a mut ActorContext,
}

impl Deref for ActorScope<'_> {
    type Target = ActorContext;

    fn deref(&self) -> &ActorContext {
        self.ctx
    }
}

impl DerefMut for ActorScope<'_> {
    fn deref_mut(&mut self) -> &mut ActorContext {
        self.ctx
    }
}

impl Drop for ActorScope<'_> {
    fn drop(&mut self) {
        self.ctx.current = None;
    }
}
