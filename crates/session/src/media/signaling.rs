use serde::{Deserialize, Serialize};

/// Tile label a produced track carries, supplemented over the teacher's
/// bare producer list (`services/src/media/signaling.rs`) so consumers can
/// render tiles without an extra round trip (SPEC_FULL.md §11). The wire
/// envelope types for the `sfu:*` event family live in `vidmesh-api`'s `ws`
/// module, which owns the exact event names spec.md §6.1 specifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerSource {
    Camera,
    Microphone,
    Screen,
}
