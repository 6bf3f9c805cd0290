#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Claw Arcade engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative round, and pure systems. Adapters and systems submit
//! [`Command`] values describing desired mutations, the round executes those
//! commands via its `apply` entry point, and then broadcasts [`Event`] values
//! for systems and the presentation layer to react to deterministically.
//! Systems consume event streams, query immutable snapshots, and respond
//! exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Label used when deriving the round's claw/grab RNG stream from a seed.
pub const RNG_STREAM_ROUND: &str = "round";
/// Label used when deriving the spawning system's RNG stream from a seed.
pub const RNG_STREAM_SPAWN: &str = "spawn";

/// Commands that express all permissible round mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Updates the player's horizontal movement intent for the claw.
    SetHorizontalIntent {
        /// Desired horizontal movement, honored only while the claw is idle.
        intent: HorizontalIntent,
    },
    /// Requests that the claw begin a drop-and-grab cycle.
    TriggerGrab,
    /// Requests that a new piece come to rest on the stack.
    SpawnPiece {
        /// Shape to spawn from the catalogue.
        shape: ShapeKey,
        /// Leftmost column of the shape's footprint.
        column: u32,
    },
    /// Shifts every resting piece one row toward the top boundary.
    AdvanceRows,
    /// Requests a terminal transition decided outside the round.
    EndRound {
        /// Why the round should end.
        reason: EndReason,
    },
}

/// Events broadcast by the round after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that a piece was placed onto the board.
    PieceSpawned {
        /// Identifier assigned to the new piece.
        piece: PieceId,
        /// Shape the piece was spawned with.
        shape: ShapeKey,
        /// Anchor cell of the placed footprint.
        anchor: CellCoord,
    },
    /// Confirms that the claw caught a piece at drop depth.
    PieceGrabbed {
        /// Identifier of the caught piece.
        piece: PieceId,
    },
    /// Reports that a completed drop cycle caught nothing.
    PieceMissed,
    /// Reports that the claw lost its carried piece mid-lift.
    PieceDropped {
        /// Identifier of the lost piece.
        piece: PieceId,
    },
    /// Confirms that a piece came to rest after falling or losing support.
    PieceSettled {
        /// Identifier of the settled piece.
        piece: PieceId,
        /// Anchor cell of the settled footprint.
        anchor: CellCoord,
    },
    /// Reports that a piece was pushed past the top boundary and removed.
    PieceEvicted {
        /// Identifier of the evicted piece.
        piece: PieceId,
    },
    /// Confirms that every resting piece shifted one row toward the top.
    RowsAdvanced,
    /// Confirms that a carried piece reached the delivery zone and scored.
    PieceDelivered {
        /// Identifier of the delivered piece.
        piece: PieceId,
        /// Points awarded for the delivery.
        score_delta: u32,
    },
    /// Announces a claw state machine transition.
    ClawStateChanged {
        /// State the claw left.
        from: ClawState,
        /// State the claw entered.
        to: ClawState,
    },
    /// Announces that the round reached a terminal state.
    RoundEnded {
        /// Why the round ended.
        reason: EndReason,
        /// Score held at the moment the round ended.
        final_score: u32,
    },
}

/// Unique identifier assigned to a piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceId(u32);

impl PieceId {
    /// Creates a new piece identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
///
/// Row zero is the top of the board; rows grow downward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Center of the cell expressed in continuous cell units.
    #[must_use]
    pub fn center(&self) -> CellPoint {
        CellPoint::new(self.column as f32 + 0.5, self.row as f32 + 0.5)
    }
}

/// Continuous position measured in cell units.
///
/// The cell at `(c, r)` spans `[c, c + 1) × [r, r + 1)`; negative `y` lies
/// above the board, which is where the claw parks between drops.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPoint {
    x: f32,
    y: f32,
}

impl CellPoint {
    /// Creates a new continuous point from cell-unit components.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Horizontal component in cell units.
    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    /// Vertical component in cell units.
    #[must_use]
    pub const fn y(&self) -> f32 {
        self.y
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(&self, other: CellPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Relative cell offset within a shape's footprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellOffset {
    dx: u32,
    dy: u32,
}

impl CellOffset {
    const fn new(dx: u32, dy: u32) -> Self {
        Self { dx, dy }
    }

    /// Horizontal offset from the footprint's leftmost column.
    #[must_use]
    pub const fn dx(&self) -> u32 {
        self.dx
    }

    /// Vertical offset from the footprint's topmost row.
    #[must_use]
    pub const fn dy(&self) -> u32 {
        self.dy
    }
}

const PRIZE_OFFSETS: [CellOffset; 1] = [CellOffset::new(0, 0)];
const I_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(0, 0),
    CellOffset::new(1, 0),
    CellOffset::new(2, 0),
    CellOffset::new(3, 0),
];
const O_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(0, 0),
    CellOffset::new(1, 0),
    CellOffset::new(0, 1),
    CellOffset::new(1, 1),
];
const T_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(1, 0),
    CellOffset::new(0, 1),
    CellOffset::new(1, 1),
    CellOffset::new(2, 1),
];
const S_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(1, 0),
    CellOffset::new(2, 0),
    CellOffset::new(0, 1),
    CellOffset::new(1, 1),
];
const Z_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(0, 0),
    CellOffset::new(1, 0),
    CellOffset::new(1, 1),
    CellOffset::new(2, 1),
];
const J_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(0, 0),
    CellOffset::new(0, 1),
    CellOffset::new(1, 1),
    CellOffset::new(2, 1),
];
const L_OFFSETS: [CellOffset; 4] = [
    CellOffset::new(2, 0),
    CellOffset::new(0, 1),
    CellOffset::new(1, 1),
    CellOffset::new(2, 1),
];

/// Catalogue key naming a grabbable shape.
///
/// The catalogue is a static table of relative offsets with no behavior:
/// the single-cell `Prize` used by the plain claw-machine variant plus the
/// seven tetrominoes used by the block variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKey {
    /// Single-cell prize.
    Prize,
    /// Four cells in a row.
    I,
    /// Two-by-two square.
    O,
    /// Three cells with a center stem.
    T,
    /// Right-leaning skew.
    S,
    /// Left-leaning skew.
    Z,
    /// Three cells with a left hook.
    J,
    /// Three cells with a right hook.
    L,
}

impl ShapeKey {
    /// Every catalogue entry, in a fixed order suitable for seeded selection.
    pub const ALL: [ShapeKey; 8] = [
        Self::Prize,
        Self::I,
        Self::O,
        Self::T,
        Self::S,
        Self::Z,
        Self::J,
        Self::L,
    ];

    /// The seven tetromino entries, excluding the single-cell prize.
    pub const TETROMINOES: [ShapeKey; 7] = [
        Self::I,
        Self::O,
        Self::T,
        Self::S,
        Self::Z,
        Self::J,
        Self::L,
    ];

    /// Relative offsets of the shape's cells, anchored at the top-left.
    #[must_use]
    pub const fn offsets(&self) -> &'static [CellOffset] {
        match self {
            Self::Prize => &PRIZE_OFFSETS,
            Self::I => &I_OFFSETS,
            Self::O => &O_OFFSETS,
            Self::T => &T_OFFSETS,
            Self::S => &S_OFFSETS,
            Self::Z => &Z_OFFSETS,
            Self::J => &J_OFFSETS,
            Self::L => &L_OFFSETS,
        }
    }

    /// Width of the footprint in whole cells.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.offsets()
            .iter()
            .map(|offset| offset.dx() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Height of the footprint in whole cells.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.offsets()
            .iter()
            .map(|offset| offset.dy() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Cosmetic color tag for the shape, passed through to presentation.
    #[must_use]
    pub const fn color(&self) -> PieceColor {
        match self {
            Self::Prize => PieceColor::from_rgb(0xff, 0xc1, 0x07),
            Self::I => PieceColor::from_rgb(0x00, 0xf0, 0xf0),
            Self::O => PieceColor::from_rgb(0xf0, 0xf0, 0x00),
            Self::T => PieceColor::from_rgb(0xa0, 0x00, 0xf0),
            Self::S => PieceColor::from_rgb(0x00, 0xf0, 0x00),
            Self::Z => PieceColor::from_rgb(0xf0, 0x00, 0x00),
            Self::J => PieceColor::from_rgb(0x00, 0x00, 0xf0),
            Self::L => PieceColor::from_rgb(0xf0, 0xa0, 0x00),
        }
    }
}

/// Visual appearance applied to a piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PieceColor {
    red: u8,
    green: u8,
    blue: u8,
}

impl PieceColor {
    /// Creates a new piece color from byte RGB components.
    #[must_use]
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Red component of the color.
    #[must_use]
    pub const fn red(&self) -> u8 {
        self.red
    }

    /// Green component of the color.
    #[must_use]
    pub const fn green(&self) -> u8 {
        self.green
    }

    /// Blue component of the color.
    #[must_use]
    pub const fn blue(&self) -> u8 {
        self.blue
    }
}

/// Lifecycle state of a piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PieceState {
    /// Sitting on the board and occupying grid cells.
    Resting,
    /// Held by the claw; removed from grid occupancy.
    Grabbed,
    /// Released mid-air and not yet settled.
    Falling,
    /// Reached the delivery zone; removed from the active set.
    Delivered,
}

/// States traversed by the claw's drop-and-deliver cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClawState {
    /// Parked at the top, accepting horizontal intent and grab requests.
    Idle,
    /// Descending toward drop depth.
    Dropping,
    /// One-tick pause at drop depth after grab resolution.
    Grabbing,
    /// Ascending back to the top, possibly carrying a piece.
    Lifting,
    /// Translating horizontally toward the delivery lane.
    Returning,
    /// One-tick pause releasing the carried piece into the delivery zone.
    Delivering,
    /// Translating back to the home position.
    Resetting,
}

/// Horizontal movement directions available to the claw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HorizontalDirection {
    /// Movement toward decreasing x.
    Left,
    /// Movement toward increasing x.
    Right,
}

/// Player intent driving the claw's horizontal position while idle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HorizontalIntent {
    /// Continuous movement while a directional control is held.
    Held(HorizontalDirection),
    /// One-shot movement toward a target x from a point-and-tap input.
    Target(f32),
    /// No movement requested; cancels a held direction.
    Released,
}

/// Reasons a round may reach a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    /// An occupied cell reached the danger line.
    DangerLine,
    /// The time-attack countdown expired.
    TimeExpired,
    /// The level's delivery goal was met.
    GoalReached,
}

/// Top-level status of a session's current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// The round is accepting commands and advancing.
    Running,
    /// The round was lost; only a restart can follow.
    GameOver,
    /// The level goal was met; awaiting advancement or restart.
    LevelComplete,
}

/// Reasons a board placement request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementError {
    /// The requested footprint extends beyond the board bounds.
    OutOfBounds,
    /// The requested footprint overlaps an occupied cell.
    Occupied,
}

/// Rules selecting the goal structure of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameMode {
    /// No goal; play until the danger line ends the round.
    Endless,
    /// Deliver as much as possible before the countdown expires.
    TimeAttack {
        /// Total time available for the round.
        duration: Duration,
    },
    /// Clear a delivery quota per level across a fixed ladder.
    Levels {
        /// Deliveries required to complete the first level.
        goal: u32,
        /// Additional deliveries required per subsequent level.
        per_level_increment: u32,
        /// Number of levels in the ladder.
        max_level: u32,
    },
}

/// Mode-specific progress exposed through session snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeProgress {
    /// Endless mode carries no goal state.
    Endless,
    /// Remaining time in a time-attack round.
    TimeAttack {
        /// Time left before the round ends.
        remaining: Duration,
    },
    /// Quota progress in a levels round.
    Levels {
        /// One-based index of the current level.
        level: u32,
        /// Deliveries made toward the current goal.
        delivered: u32,
        /// Deliveries required to complete the level.
        goal: u32,
    },
}

/// Immutable representation of a single piece's state used for queries.
#[derive(Clone, Debug, PartialEq)]
pub struct PieceSnapshot {
    /// Unique identifier assigned to the piece.
    pub id: PieceId,
    /// Shape the piece was spawned with.
    pub shape: ShapeKey,
    /// Cosmetic color tag derived from the shape.
    pub color: PieceColor,
    /// Lifecycle state of the piece.
    pub state: PieceState,
    /// Anchor cell of the footprint while the piece rests on the board.
    pub anchor: CellCoord,
    /// Cells occupied by the piece while it rests on the board.
    pub cells: Vec<CellCoord>,
    /// Center of the piece in continuous cell units; tracks the claw while
    /// the piece is carried.
    pub position: CellPoint,
}

/// Read-only snapshot describing all active pieces in a round.
#[derive(Clone, Debug, Default)]
pub struct PieceView {
    snapshots: Vec<PieceSnapshot>,
}

impl PieceView {
    /// Creates a new piece view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<PieceSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured piece snapshots in deterministic order.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = &PieceSnapshot> {
        self.snapshots.iter()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<PieceSnapshot> {
        self.snapshots
    }
}

/// Immutable representation of the claw used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClawSnapshot {
    /// Current state machine state.
    pub state: ClawState,
    /// Current position in continuous cell units.
    pub position: CellPoint,
    /// Piece currently held by the claw, if any.
    pub carried: Option<PieceId>,
}

/// Read-only view into the dense occupancy grid.
#[derive(Clone, Copy, Debug)]
pub struct OccupancyView<'a> {
    cells: &'a [Option<PieceId>],
    columns: u32,
    rows: u32,
}

impl<'a> OccupancyView<'a> {
    /// Captures a new occupancy view backed by the provided cell slice.
    #[must_use]
    pub fn new(cells: &'a [Option<PieceId>], columns: u32, rows: u32) -> Self {
        Self {
            cells,
            columns,
            rows,
        }
    }

    /// Returns the piece occupying the provided cell, if any.
    #[must_use]
    pub fn occupant(&self, cell: CellCoord) -> Option<PieceId> {
        self.index(cell)
            .and_then(|index| self.cells.get(index).copied().flatten())
    }

    /// Reports whether the cell is currently free.
    #[must_use]
    pub fn is_free(&self, cell: CellCoord) -> bool {
        self.index(cell).map_or(true, |index| {
            self.cells.get(index).copied().unwrap_or(None).is_none()
        })
    }

    /// Returns an iterator over all cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = Option<PieceId>> + 'a {
        self.cells.iter().copied()
    }

    /// Provides the dimensions of the underlying occupancy grid.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() < self.columns && cell.row() < self.rows {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }
}

/// Owned copy of the board occupancy used in session snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardSnapshot {
    /// Number of columns in the board.
    pub columns: u32,
    /// Number of rows in the board.
    pub rows: u32,
    /// Row index of the danger line.
    pub danger_row: u32,
    /// Occupancy cells in row-major order.
    pub cells: Vec<Option<PieceId>>,
}

impl BoardSnapshot {
    /// Returns the piece occupying the provided cell, if any.
    #[must_use]
    pub fn occupant(&self, cell: CellCoord) -> Option<PieceId> {
        OccupancyView::new(&self.cells, self.columns, self.rows).occupant(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CellCoord, CellPoint, EndReason, PieceId, PlacementError, ShapeKey,
    };
    use serde::{de::DeserializeOwned, Serialize};

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn piece_id_round_trips_through_bincode() {
        assert_round_trip(&PieceId::new(42));
    }

    #[test]
    fn cell_coord_round_trips_through_bincode() {
        assert_round_trip(&CellCoord::new(5, 7));
    }

    #[test]
    fn shape_key_round_trips_through_bincode() {
        assert_round_trip(&ShapeKey::T);
    }

    #[test]
    fn end_reason_round_trips_through_bincode() {
        assert_round_trip(&EndReason::DangerLine);
    }

    #[test]
    fn placement_error_round_trips_through_bincode() {
        assert_round_trip(&PlacementError::Occupied);
    }

    #[test]
    fn shape_footprints_match_catalogue() {
        assert_eq!(ShapeKey::Prize.offsets().len(), 1);
        for shape in ShapeKey::TETROMINOES {
            assert_eq!(shape.offsets().len(), 4, "{shape:?} must span four cells");
        }
        assert_eq!(ShapeKey::I.width(), 4);
        assert_eq!(ShapeKey::I.height(), 1);
        assert_eq!(ShapeKey::O.width(), 2);
        assert_eq!(ShapeKey::O.height(), 2);
        assert_eq!(ShapeKey::T.width(), 3);
        assert_eq!(ShapeKey::T.height(), 2);
        assert_eq!(ShapeKey::L.width(), 3);
        assert_eq!(ShapeKey::L.height(), 2);
    }

    #[test]
    fn cell_center_lands_mid_cell() {
        let center = CellCoord::new(3, 7).center();
        assert_eq!(center, CellPoint::new(3.5, 7.5));
    }

    #[test]
    fn distance_is_euclidean() {
        let origin = CellPoint::new(0.0, 0.0);
        let target = CellPoint::new(3.0, 4.0);
        assert!((origin.distance_to(target) - 5.0).abs() < f32::EPSILON);
    }
}
