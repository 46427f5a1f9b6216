//! `dsio` is a Rust library for reading and writing typed multidimensional datasets.
//!
//! A dataset is a named array of elements with an [element type](element_type::ElementType) and an [extent](selection::Extent), held in a [container](container::Container) over a store.
//! Elements are transferred between a dataset and an application buffer through [selections](selection::Selection) of the file and memory dataspaces.
//! When the element types of the dataset and the application buffer differ, elements are converted in bounded strips through a transfer buffer.
//!
//! `dsio` supports:
//! - fixed size integer, floating point and compound element types with either byte order,
//! - hyperslab and point selections, with independent file and memory selections,
//! - contiguous layouts, optionally split over external file segments,
//! - chunked layouts with an extensible [filter pipeline](filter::FilterPipeline) (shuffle, fletcher32, deflate, zstd, and user-registered filters),
//! - fill values and fill times,
//! - extendible datasets, and
//! - a collective access backend with per-transfer mode selection.
//!
//! ## Getting Started
//! ```
//! # use std::sync::Arc;
//! use dsio::{
//!     container::Container,
//!     dataset::{DatasetBuilder, TransferConfig},
//!     element_type::ElementType,
//!     filter::{FilterPipeline, FILTER_SHUFFLE},
//!     registry::Registry,
//!     selection::{Dataspace, Extent, Selection},
//!     storage::store::MemoryStore,
//! };
//!
//! let registry = Arc::new(Registry::new_initialized());
//! let container = Container::new(Arc::new(MemoryStore::new()), registry);
//!
//! // Create a chunked 4x6 dataset of big-endian 32-bit integers
//! let element_type = ElementType::INT32.with_byte_order(dsio::element_type::ByteOrder::Big);
//! let mut dataset = DatasetBuilder::new(element_type, Extent::new(vec![4, 6]))
//!     .chunk_shape(vec![2, 3])
//!     .filters(FilterPipeline::new().with_filter(FILTER_SHUFFLE, vec![]))
//!     .build(&container, "example")?;
//!
//! // Write native 64-bit floats to a 2x2 block, converting them to the dataset element type
//! let file_space = dataset.space().select(Selection::range(&[1..3, 2..4]))?;
//! let values = [1.0f64, 2.0, 3.0, 4.0];
//! dataset.write(
//!     &ElementType::FLOAT64,
//!     Some(&Dataspace::new_fixed(vec![4])),
//!     Some(&file_space),
//!     &mut TransferConfig::new(),
//!     bytemuck::cast_slice(&values),
//! )?;
//!
//! let elements: Vec<i32> = dataset.read_elements(&Selection::range(&[1..2, 0..6]))?;
//! assert_eq!(elements, [0, 0, 1, 2, 0, 0]);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `filesystem`: Re-export `dsio_filesystem` as `dsio::filesystem`.
//!  - `deflate`: Enable the deflate filter.
//!  - `zstd`: Enable the zstd filter.
//!
//! ## Licence
//! `dsio` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::wildcard_enum_match_arm)]

pub mod config;
pub mod container;
pub mod dataset;
pub mod element_type;
pub mod filter;
pub mod registry;
pub mod selection;

#[cfg(feature = "filesystem")]
pub use dsio_filesystem as filesystem;
pub use dsio_storage as storage;
