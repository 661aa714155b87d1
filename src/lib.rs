//! freshet: streaming connected components with sublinear memory.
//!
//! Maintains an undirected multigraph under a stream of edge insertions
//! and deletions and answers connected-components queries at arbitrary
//! points in the stream. Instead of storing the graph, every vertex keeps
//! an L0-sampling sketch of its incident edges; a sketch-space Borůvka
//! extracts a spanning forest from those sketches on demand.
//!
//! # Architecture
//!
//! ```text
//! stream file ──► MtStreamReader threads ──► Graph::update
//!                                               │
//!                                               ▼
//!                                        GutteringSystem  (per-source batching)
//!                                               │
//!                                               ▼
//!                                        worker threads ──► Supernode::merge(delta)
//!
//! point_query / connected_components:
//!     drain gutter ──► eager DSU (fast path) or sketch Borůvka (full query)
//! ```
//!
//! - [`stream`]: binary edge-stream sources, including a multi-reader
//!   variant with cooperative pause points for queries.
//! - [`gutter`]: write batching that amortises sketch updates by grouping
//!   updates per source vertex.
//! - [`sketch`]: the L0 sketches and the per-vertex [`sketch::Supernode`].
//! - [`dsu`]: lock-free union-find; with the eager mode on, insertions
//!   maintain a live spanning forest so point queries skip the sketches.
//! - [`graph`]: the engine tying it all together.
//!
//! # Example
//!
//! ```rust,ignore
//! use freshet::{Graph, GraphConfiguration, GraphUpdate};
//!
//! let graph = Graph::new(4, GraphConfiguration::new().seed(1))?;
//! graph.update(GraphUpdate::insert(0, 1), 0)?;
//! graph.update(GraphUpdate::insert(1, 2), 0)?;
//! assert!(graph.point_query(0, 2)?);
//! let components = graph.connected_components(false)?;
//! ```
//!
//! # Probabilistic contract
//!
//! Sketch queries are correct with high probability. When a supernode
//! exhausts its samplers mid-query the engine reports
//! [`GraphError::CCFailure`] to the caller rather than fabricating an
//! answer; a continuing query (`cont = true`) is rolled back to its
//! pre-query sketches first.

pub mod config;
pub mod dsu;
pub mod error;
pub mod graph;
pub mod gutter;
pub mod sketch;
pub mod stream;
pub mod types;

pub use config::{GraphConfiguration, GutterConfiguration, GutterSystem};
pub use error::{GraphError, Result};
pub use graph::Graph;
pub use sketch::{SampleResult, Supernode};
pub use stream::{BinaryGraphStream, BinaryGraphStreamMt, MtStreamReader};
pub use types::{Edge, GraphUpdate, NodeId, UpdateKind};
