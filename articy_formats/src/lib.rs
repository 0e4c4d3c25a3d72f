pub mod export;

pub use export::{
    RawCharacter, RawDialogue, RawExpressionNode, RawFragment, RawProject,
};
