// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

mod kind;
mod message;
mod role;

pub use kind::*;
pub use message::*;
pub use role::*;
