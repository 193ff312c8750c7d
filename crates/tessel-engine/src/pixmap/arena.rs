use crate::error::{EngineError, Result};

use super::Pixmap;

/// Generation-checked pixmap handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PixmapId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    pixmap: Option<Pixmap>,
}

/// Slot arena owning every pixmap of a context.
///
/// Handles to removed pixmaps go stale and fail lookups instead of aliasing
/// a later pixmap in the same slot.
#[derive(Debug, Default)]
pub struct PixmapArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl PixmapArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pixmap: Pixmap) -> PixmapId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.pixmap = Some(pixmap);
            return PixmapId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            pixmap: Some(pixmap),
        });
        PixmapId {
            index: self.slots.len() as u32 - 1,
            generation: 0,
        }
    }

    pub fn get(&self, id: PixmapId) -> Result<&Pixmap> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.pixmap.as_ref())
            .ok_or(EngineError::StalePixmap)
    }

    pub fn get_mut(&mut self, id: PixmapId) -> Result<&mut Pixmap> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.pixmap.as_mut())
            .ok_or(EngineError::StalePixmap)
    }

    /// Mutable access to two distinct pixmaps at once.
    pub fn get_pair_mut(&mut self, a: PixmapId, b: PixmapId) -> Result<(&mut Pixmap, &mut Pixmap)> {
        if a.index == b.index {
            return Err(EngineError::InvalidArgument("pixmap paired with itself".into()));
        }
        self.get(a)?;
        self.get(b)?;
        let (lo, hi, swapped) = if a.index < b.index {
            (a.index as usize, b.index as usize, false)
        } else {
            (b.index as usize, a.index as usize, true)
        };
        let (head, tail) = self.slots.split_at_mut(hi);
        let (Some(p), Some(q)) = (head[lo].pixmap.as_mut(), tail[0].pixmap.as_mut()) else {
            return Err(EngineError::StalePixmap);
        };
        Ok(if swapped { (q, p) } else { (p, q) })
    }

    pub fn remove(&mut self, id: PixmapId) -> Result<Pixmap> {
        self.get(id)?;
        let slot = &mut self.slots[id.index as usize];
        let pixmap = slot.pixmap.take().ok_or(EngineError::StalePixmap)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(pixmap)
    }

    pub fn ids(&self) -> Vec<PixmapId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.pixmap.is_some())
            .map(|(i, s)| PixmapId {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.pixmap.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixmap::PixmapUsage;

    fn pm(w: u32) -> Pixmap {
        Pixmap::new(w, 1, 32, None, PixmapUsage::Gpu)
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut arena = PixmapArena::new();
        let a = arena.insert(pm(1));
        arena.remove(a).unwrap();
        let b = arena.insert(pm(2));
        assert!(matches!(arena.get(a), Err(EngineError::StalePixmap)));
        assert_eq!(arena.get(b).unwrap().width(), 2);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn pairs_come_back_in_argument_order() {
        let mut arena = PixmapArena::new();
        let a = arena.insert(pm(1));
        let b = arena.insert(pm(2));
        let (q, p) = arena.get_pair_mut(b, a).unwrap();
        assert_eq!((q.width(), p.width()), (2, 1));
        assert!(arena.get_pair_mut(a, a).is_err());
    }
}
