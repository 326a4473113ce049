//! Wire types shared between the chat client core and its presentation shells.

pub mod domain;
pub mod protocol;
