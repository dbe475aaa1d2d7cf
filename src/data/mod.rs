/// Data layer: raw products, geometry and batch I/O.
///
/// Architecture:
/// ```text
///  batch .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Batch (one Entry per index)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  batch    │  Entry: raw products + typed objects + match pairs
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  meta     │  px ↔ cm conversion, containment
///   └──────────┘
/// ```

pub mod batch;
pub mod globals;
pub mod loader;
pub mod meta;
pub mod rows;
pub mod sample;
