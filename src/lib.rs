// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

//! # cellmesh
//!
//! An overlay of relay nodes connecting arithmetic cells. Requesters queue
//! `Addition`, `Subtraction`, `Multiplication` and `Division` requests,
//! servers answer with `PrintResult` messages, and relay nodes forward every
//! frame between the cells attached to them and the rest of the mesh.
//! Delivery is at-least-once, made reliable by application-level Acks and
//! threshold-triggered resends; each result is reported to its requester once.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cellmesh::config::MeshConfig;
//! use cellmesh::p2p::{Cell, CellProfile, Operation};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), cellmesh::p2p::P2pError> {
//! let config = MeshConfig::default();
//! let cell = Cell::connect(CellProfile::requester(), &config).await?;
//! cell.requester_handle().submit(Operation::Div, 10, 2);
//! cell.run(Arc::new(|text: String| println!("{}", text)), CancellationToken::new()).await
//! # }
//! ```

pub use cellmesh_base as base;
pub use cellmesh_config as config;
pub use cellmesh_p2p as p2p;
