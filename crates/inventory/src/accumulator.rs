use serde::Serialize;

use bodega_core::{PositionId, ProductId};

use crate::scan::{Position, ScanResult};

/// Identity of an accumulated line: one per (product, position) in a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub position_id: PositionId,
}

impl LineKey {
    pub fn new(product_id: ProductId, position_id: PositionId) -> Self {
        Self {
            product_id,
            position_id,
        }
    }
}

/// Running tally of one product at one position.
///
/// Invariant: `1 <= scanned_quantity <= available_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccumulatedLine {
    product_id: ProductId,
    position: Position,
    sku: String,
    scanned_quantity: u32,
    available_quantity: u32,
    note: String,
}

impl AccumulatedLine {
    /// Build a line from previously saved data.
    ///
    /// Returns `None` for a zero quantity. When the saved quantity exceeds the
    /// reported availability the ceiling is raised to the saved quantity.
    pub fn restore(
        product_id: ProductId,
        position: Position,
        sku: impl Into<String>,
        scanned_quantity: u32,
        available_quantity: u32,
        note: impl Into<String>,
    ) -> Option<Self> {
        if scanned_quantity == 0 {
            return None;
        }
        Some(Self {
            product_id,
            position,
            sku: sku.into(),
            scanned_quantity,
            available_quantity: available_quantity.max(scanned_quantity),
            note: note.into(),
        })
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id, self.position.id)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn position_id(&self) -> PositionId {
        self.position.id
    }

    pub fn position_label(&self) -> &str {
        &self.position.label
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn scanned_quantity(&self) -> u32 {
        self.scanned_quantity
    }

    pub fn available_quantity(&self) -> u32 {
        self.available_quantity
    }

    pub fn note(&self) -> &str {
        &self.note
    }
}

/// Result of applying one scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Added,
    Incremented,
    /// The scan would exceed available stock; the line was left unchanged.
    Capped,
}

/// The set of lines scanned during one session, in first-scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    lines: Vec<AccumulatedLine>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the accumulator, merging any duplicate keys into the first line.
    pub fn from_lines(lines: impl IntoIterator<Item = AccumulatedLine>) -> Self {
        let mut acc = Self::new();
        for line in lines {
            match acc.position_of(line.key()) {
                Some(idx) => {
                    let existing = &mut acc.lines[idx];
                    existing.scanned_quantity = existing
                        .scanned_quantity
                        .saturating_add(line.scanned_quantity);
                    existing.available_quantity = existing
                        .available_quantity
                        .max(line.available_quantity)
                        .max(existing.scanned_quantity);
                }
                None => acc.lines.push(line),
            }
        }
        acc
    }

    pub fn lines(&self) -> &[AccumulatedLine] {
        &self.lines
    }

    pub fn get(&self, key: LineKey) -> Option<&AccumulatedLine> {
        self.lines.iter().find(|l| l.key() == key)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn position_of(&self, key: LineKey) -> Option<usize> {
        self.lines.iter().position(|l| l.key() == key)
    }

    fn line_mut(&mut self, key: LineKey) -> Option<&mut AccumulatedLine> {
        self.lines.iter_mut().find(|l| l.key() == key)
    }

    /// Count one scan of `scan` at `position`.
    pub fn apply(&mut self, scan: &ScanResult, position: &Position) -> ApplyOutcome {
        let key = LineKey::new(scan.product_id, position.id);

        let Some(idx) = self.position_of(key) else {
            if scan.available_quantity == 0 {
                return ApplyOutcome::Capped;
            }
            self.lines.push(AccumulatedLine {
                product_id: scan.product_id,
                position: position.clone(),
                sku: scan.sku.clone(),
                scanned_quantity: 1,
                available_quantity: scan.available_quantity,
                note: String::new(),
            });
            return ApplyOutcome::Added;
        };

        // Availability may have moved since the line was created; compare
        // against the fresh figure.
        let line = &mut self.lines[idx];
        let Some(next) = line
            .scanned_quantity
            .checked_add(1)
            .filter(|next| *next <= scan.available_quantity)
        else {
            return ApplyOutcome::Capped;
        };
        line.scanned_quantity = next;
        line.available_quantity = scan.available_quantity;
        ApplyOutcome::Incremented
    }

    /// Manual +1. Clamps at the ceiling. Returns the resulting quantity.
    pub fn increment(&mut self, key: LineKey) -> Option<u32> {
        let line = self.line_mut(key)?;
        line.scanned_quantity = line
            .scanned_quantity
            .saturating_add(1)
            .min(line.available_quantity);
        Some(line.scanned_quantity)
    }

    /// Manual -1. Never goes below 1; use [`Accumulator::remove`] to drop a line.
    pub fn decrement(&mut self, key: LineKey) -> Option<u32> {
        let line = self.line_mut(key)?;
        line.scanned_quantity = line.scanned_quantity.saturating_sub(1).max(1);
        Some(line.scanned_quantity)
    }

    /// Set a quantity typed by the user, clamped into `[1, available]`.
    pub fn set_quantity(&mut self, key: LineKey, quantity: u32) -> Option<u32> {
        let line = self.line_mut(key)?;
        line.scanned_quantity = quantity.clamp(1, line.available_quantity);
        Some(line.scanned_quantity)
    }

    pub fn set_note(&mut self, key: LineKey, note: impl Into<String>) -> bool {
        match self.line_mut(key) {
            Some(line) => {
                line.note = note.into();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: LineKey) -> Option<AccumulatedLine> {
        let idx = self.position_of(key)?;
        Some(self.lines.remove(idx))
    }

    /// Drop every line counted at `position_id`. Returns how many were dropped.
    pub fn reset_for_position(&mut self, position_id: PositionId) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| l.position.id != position_id);
        before - self.lines.len()
    }

    pub fn reset_all(&mut self) -> usize {
        let dropped = self.lines.len();
        self.lines.clear();
        dropped
    }

    /// Keys of the lines counted at `position_id`, in first-scan order.
    pub fn keys_at(&self, position_id: PositionId) -> Vec<LineKey> {
        self.lines
            .iter()
            .filter(|l| l.position.id == position_id)
            .map(AccumulatedLine::key)
            .collect()
    }
}
