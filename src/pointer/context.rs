//! Context abstraction and selectors (§3 `Context`, §9 `ContextSelector`).
//!
//! A context is a bounded stack of interned tokens. Which entity gets
//! interned as a token — a call site, a heap object, or a type — depends on
//! the selector variant; the context itself is just an opaque, structurally
//! comparable key, exactly as §3 specifies.

use crate::ir::{CallSite, ClassRef};

use super::Obj;

/// An opaque, structurally-equal context key. Empty for context-insensitive
/// analysis (C6); length-bounded by `k` for the k-CFA variants (C7).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Context(Vec<ContextToken>);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
enum ContextToken {
    CallSite(CallSite),
    Object(Box<Obj>),
    Type(ClassRef),
}

impl Context {
    #[must_use]
    pub fn empty() -> Self {
        Context(Vec::new())
    }

    fn pushed(&self, token: ContextToken, k: usize) -> Context {
        if k == 0 {
            return Context::empty();
        }
        let mut tokens = self.0.clone();
        tokens.push(token);
        if tokens.len() > k {
            tokens.remove(0);
        }
        Context(tokens)
    }
}

/// The context-selection capability (§9): empty context, a selector for
/// static/special calls, one for instance calls (keyed by receiver object),
/// and one for heap contexts at allocation sites.
pub trait ContextSelector {
    fn empty_context(&self) -> Context {
        Context::empty()
    }

    fn select_for_static_call(&self, caller_ctx: &Context, call_site: &CallSite) -> Context;

    fn select_for_instance_call(
        &self,
        caller_ctx: &Context,
        call_site: &CallSite,
        receiver: &Obj,
    ) -> Context;

    fn select_heap_context(&self, method_ctx: &Context, alloc_site: &CallSite) -> Context;
}

/// C6: all contexts are the empty context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextInsensitive;

impl ContextSelector for ContextInsensitive {
    fn select_for_static_call(&self, _caller_ctx: &Context, _call_site: &CallSite) -> Context {
        Context::empty()
    }

    fn select_for_instance_call(
        &self,
        _caller_ctx: &Context,
        _call_site: &CallSite,
        _receiver: &Obj,
    ) -> Context {
        Context::empty()
    }

    fn select_heap_context(&self, _method_ctx: &Context, _alloc_site: &CallSite) -> Context {
        Context::empty()
    }
}

/// k-call-site sensitivity: contexts are the last `k` call sites.
#[derive(Debug, Clone, Copy)]
pub struct CallSiteSensitive {
    pub k: usize,
}

impl ContextSelector for CallSiteSensitive {
    fn select_for_static_call(&self, caller_ctx: &Context, call_site: &CallSite) -> Context {
        caller_ctx.pushed(ContextToken::CallSite(call_site.clone()), self.k)
    }

    fn select_for_instance_call(
        &self,
        caller_ctx: &Context,
        call_site: &CallSite,
        _receiver: &Obj,
    ) -> Context {
        caller_ctx.pushed(ContextToken::CallSite(call_site.clone()), self.k)
    }

    fn select_heap_context(&self, method_ctx: &Context, _alloc_site: &CallSite) -> Context {
        method_ctx.clone()
    }
}

/// k-object sensitivity: contexts are the last `k` receiver objects. Static
/// calls inherit the caller's context (there is no receiver to extend with).
#[derive(Debug, Clone, Copy)]
pub struct ObjectSensitive {
    pub k: usize,
}

impl ContextSelector for ObjectSensitive {
    fn select_for_static_call(&self, caller_ctx: &Context, _call_site: &CallSite) -> Context {
        caller_ctx.clone()
    }

    fn select_for_instance_call(
        &self,
        _caller_ctx: &Context,
        _call_site: &CallSite,
        receiver: &Obj,
    ) -> Context {
        // The receiver's own allocation context becomes the prefix, extended
        // with the receiver object itself (1-level object sensitivity
        // generalized to k).
        let base = receiver.heap_context().cloned().unwrap_or_default();
        base.pushed(ContextToken::Object(Box::new(receiver.clone())), self.k)
    }

    fn select_heap_context(&self, method_ctx: &Context, _alloc_site: &CallSite) -> Context {
        method_ctx.clone()
    }
}

/// k-type sensitivity: like k-object, but keyed by the receiver's allocation
/// class instead of its full identity.
#[derive(Debug, Clone, Copy)]
pub struct TypeSensitive {
    pub k: usize,
}

impl ContextSelector for TypeSensitive {
    fn select_for_static_call(&self, caller_ctx: &Context, _call_site: &CallSite) -> Context {
        caller_ctx.clone()
    }

    fn select_for_instance_call(
        &self,
        caller_ctx: &Context,
        _call_site: &CallSite,
        receiver: &Obj,
    ) -> Context {
        caller_ctx.pushed(ContextToken::Type(receiver.allocated_type()), self.k)
    }

    fn select_heap_context(&self, method_ctx: &Context, _alloc_site: &CallSite) -> Context {
        method_ctx.clone()
    }
}
