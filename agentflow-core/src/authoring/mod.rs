//! Authoring vocabulary: DTOs, graph assembly, structural validation.

pub mod dto;
pub mod validate;

pub use dto::{
    BranchDto, EdgeDto, FallbackDto, Graph, KnownNodeDto, MetadataDto, NodeDto, UnknownNodeDto,
    WorkflowDto,
};
pub use validate::{build_and_validate, build_and_validate_dto, validate_workflow, BuildOutput};
