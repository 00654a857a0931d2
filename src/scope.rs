//! Access scope resolver.
//!
//! Every list query passes through [`scope`] before it reaches the store.
//! Non-admins are pinned to tasks assigned to them, whatever `assigned_to`
//! they asked for; admins see everything their own filters allow.

use crate::models::Caller;
use crate::query::QueryDescriptor;

pub fn scope(mut descriptor: QueryDescriptor, caller: &Caller) -> QueryDescriptor {
    if !caller.role.is_admin() {
        descriptor.filter.assigned_to = Some(caller.id);
    }
    descriptor
}
