//! Generic intrusive-style containers (spec.md §4.1, "Intrusive hash
//! list", and §3's hash list / FIFO list / red-black tree requirements).
//!
//! The teacher's containers (`examples/kaist-cp-rv6/kernel-rs/src/ds/list.rs`,
//! `util/list.rs`) are genuinely intrusive: nodes are embedded directly in
//! the owning struct and linked via raw `*mut` pointers, because a
//! `no_std` kernel has no allocator-backed `Vec`/`Box` it can rely on for
//! bookkeeping separate from the object pool it already owns.
//!
//! This crate targets `std`, so the cyclic-ownership/raw-pointer pattern
//! is replaced by the "arenas + indices" strategy spec.md §9's Design
//! Notes call out explicitly for this exact situation: each container
//! owns a `Vec` of slots and hands back small integer handles instead of
//! pointers. The effect is the same — O(1) insert/remove/splice without a
//! separate allocation per operation — without unsafe intrusive pointers.

pub mod hash_list;
pub mod list;
pub mod rbtree;

pub use hash_list::HashList;
pub use list::List;
pub use rbtree::RbTree;
