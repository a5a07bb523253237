// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

mod frame;

pub use frame::*;
