pub mod stage0_segment;
pub mod stage1_annotate;
pub mod stage2_merge;
pub mod stage3_plan;
pub mod stage4_organize;

pub use stage0_segment::*;
pub use stage1_annotate::*;
pub use stage2_merge::*;
pub use stage3_plan::*;
pub use stage4_organize::*;
