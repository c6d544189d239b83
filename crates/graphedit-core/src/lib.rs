pub mod change;
pub mod error;
pub mod graph;
pub mod id;
pub mod item;
pub mod prop;

// Re-export commonly used types
pub use change::Change;
pub use error::CoreError;
pub use graph::ItemGraph;
pub use id::{Arena, ItemId};
pub use item::{
    Container, Edge, InstanceNode, Item, ModifierNode, PinType, PlainNode, PseudoKind, PseudoNode,
    Signature,
};
pub use prop::{ChildProp, Prop, Value};
