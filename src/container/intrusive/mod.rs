pub mod linked_list;

#[doc(inline)]
pub use linked_list::{LinkedList, Node};
