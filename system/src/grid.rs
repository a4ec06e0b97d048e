use crate::types::{CellId, Color, GridDimensions, SessionId, Timestamp};

/// Ownership of a claimed cell. A cell either carries all of it or none of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellClaim {
    pub owner: SessionId,
    pub color: Color,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub index: CellId,
    pub claim: Option<CellClaim>,
}

impl Cell {
    fn unclaimed(index: CellId) -> Self {
        Self { index, claim: None }
    }

    pub fn owner(&self) -> Option<&SessionId> {
        self.claim.as_ref().map(|c| &c.owner)
    }

    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("invalid cell id")]
    OutOfRange(i64),
    #[error("cell {index} is already owned by {owner}")]
    Conflict { index: CellId, owner: SessionId },
}

/// Authoritative cell state. The number of cells is fixed at construction and
/// `apply` is the only mutator.
#[derive(Debug, Clone)]
pub struct Grid {
    dimensions: GridDimensions,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(dimensions: GridDimensions) -> Self {
        let cells = (0..dimensions.cell_count()).map(Cell::unclaimed).collect();
        Self { dimensions, cells }
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Maps a client supplied index onto the grid.
    pub fn checked_index(&self, index: i64) -> Result<CellId, GridError> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.cells.len())
            .ok_or(GridError::OutOfRange(index))
    }

    pub fn get(&self, index: i64) -> Result<&Cell, GridError> {
        let index = self.checked_index(index)?;
        Ok(&self.cells[index])
    }

    /// Claims an unowned cell. Any existing owner, including `owner` itself,
    /// is a conflict; deciding what a self-claim means is up to the caller.
    pub fn apply(
        &mut self,
        index: i64,
        owner: SessionId,
        color: Color,
        updated_at: Timestamp,
    ) -> Result<&Cell, GridError> {
        let index = self.checked_index(index)?;
        let cell = &mut self.cells[index];
        if let Some(existing) = cell.owner() {
            return Err(GridError::Conflict {
                index,
                owner: *existing,
            });
        }
        cell.claim = Some(CellClaim {
            owner,
            color,
            updated_at,
        });
        Ok(cell)
    }

    pub fn snapshot(&self) -> Vec<Cell> {
        self.cells.clone()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn claimed_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_claimed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn grid() -> Grid {
        Grid::new(GridDimensions::new(2, 3))
    }

    #[test]
    fn it_creates_all_cells_unclaimed() {
        let grid = grid();
        assert_eq!(grid.len(), 6);
        assert!(grid.cells().all(|c| c.claim.is_none()));
        assert_eq!(
            grid.snapshot().iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn it_rejects_out_of_range_index() {
        let mut grid = grid();
        assert_eq!(grid.get(-1).err(), Some(GridError::OutOfRange(-1)));
        assert_eq!(grid.get(6).err(), Some(GridError::OutOfRange(6)));
        let result = grid.apply(6, Uuid::new_v4(), Color::new(1, 70, 50), 10);
        assert_eq!(result.err(), Some(GridError::OutOfRange(6)));
        assert_eq!(grid.claimed_count(), 0);
    }

    #[test]
    fn it_commits_claim_on_unowned_cell() {
        let mut grid = grid();
        let owner = Uuid::new_v4();
        let color = Color::new(120, 80, 50);
        let cell = grid.apply(4, owner, color, 1234).expect("").clone();
        assert_eq!(
            cell.claim,
            Some(CellClaim {
                owner,
                color,
                updated_at: 1234
            })
        );
        assert_eq!(grid.get(4).expect(""), &cell);
        assert_eq!(grid.claimed_count(), 1);
    }

    #[test]
    fn it_never_overwrites_an_owner() {
        let mut grid = grid();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        grid.apply(0, first, Color::new(1, 70, 50), 1).expect("");

        let result = grid.apply(0, second, Color::new(2, 70, 50), 2);
        assert_eq!(
            result.err(),
            Some(GridError::Conflict {
                index: 0,
                owner: first
            })
        );
        assert_eq!(grid.get(0).expect("").owner(), Some(&first));
        assert_eq!(grid.len(), 6);
    }
}
