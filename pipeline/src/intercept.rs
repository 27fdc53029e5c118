//! Observer hooks at the three dispatch stages.
//!
//! Hooks see the packet, message or entity event together with the current
//! [`Demo`]. Pre hooks run before the item is applied, post hooks after.
//! They observe only; nothing a hook does changes what gets decoded.

use codec::EntityEvent;

use crate::demo::Demo;
use crate::packet::{DecodedPacket, Message};

type DemoPacketHook = Box<dyn FnMut(&DecodedPacket, &Demo)>;
type MessagePacketHook = Box<dyn FnMut(&Message, &Demo)>;
type EntityPacketHook = Box<dyn FnMut(&EntityEvent, &Demo)>;

/// Dispatch stage a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptStage {
    DemoPacket,
    MessagePacket,
    EntityPacket,
}

/// A hook, tagged by the stage it observes.
pub enum Interceptor {
    DemoPacket(DemoPacketHook),
    MessagePacket(MessagePacketHook),
    EntityPacket(EntityPacketHook),
}

impl Interceptor {
    pub fn demo_packet(hook: impl FnMut(&DecodedPacket, &Demo) + 'static) -> Self {
        Self::DemoPacket(Box::new(hook))
    }

    pub fn message_packet(hook: impl FnMut(&Message, &Demo) + 'static) -> Self {
        Self::MessagePacket(Box::new(hook))
    }

    pub fn entity_packet(hook: impl FnMut(&EntityEvent, &Demo) + 'static) -> Self {
        Self::EntityPacket(Box::new(hook))
    }

    #[must_use]
    pub const fn stage(&self) -> InterceptStage {
        match self {
            Self::DemoPacket(_) => InterceptStage::DemoPacket,
            Self::MessagePacket(_) => InterceptStage::MessagePacket,
            Self::EntityPacket(_) => InterceptStage::EntityPacket,
        }
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Interceptor").field(&self.stage()).finish()
    }
}

/// Returned on registration; used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

/// Hooks of one phase (pre or post) in registration order.
#[derive(Debug, Default)]
pub(crate) struct Hooks {
    hooks: Vec<(InterceptorId, Interceptor)>,
}

impl Hooks {
    pub(crate) fn register(&mut self, id: InterceptorId, interceptor: Interceptor) {
        self.hooks.push((id, interceptor));
    }

    pub(crate) fn unregister(&mut self, id: InterceptorId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(hook, _)| *hook != id);
        self.hooks.len() != before
    }

    pub(crate) fn has(&self, stage: InterceptStage) -> bool {
        self.hooks.iter().any(|(_, hook)| hook.stage() == stage)
    }

    pub(crate) fn demo_packet(&mut self, packet: &DecodedPacket, demo: &Demo) {
        for (_, hook) in &mut self.hooks {
            if let Interceptor::DemoPacket(hook) = hook {
                hook(packet, demo);
            }
        }
    }

    pub(crate) fn message_packet(&mut self, message: &Message, demo: &Demo) {
        for (_, hook) in &mut self.hooks {
            if let Interceptor::MessagePacket(hook) = hook {
                hook(message, demo);
            }
        }
    }

    pub(crate) fn entity_packet(&mut self, event: &EntityEvent, demo: &Demo) {
        for (_, hook) in &mut self.hooks {
            if let Interceptor::EntityPacket(hook) = hook {
                hook(event, demo);
            }
        }
    }
}

/// Hands out interceptor ids; shared by the pre and post phases so an id
/// names exactly one hook.
#[derive(Debug, Default)]
pub(crate) struct IdSource(u64);

impl IdSource {
    pub(crate) fn next(&mut self) -> InterceptorId {
        let id = InterceptorId(self.0);
        self.0 += 1;
        id
    }
}
