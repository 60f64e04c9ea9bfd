use std::ops::Range;


pub const VERTICES_PER_SPLAT: u32 = 6;


/// vertex ranges for consecutive draw calls, none longer than the cap
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawChunks {
    next: u32,
    end: u32,
    max_vertices_per_draw: u32,
}

/// a cap of 0 issues everything in one draw
pub fn draw_chunks(
    splat_count: u32,
    max_vertices_per_draw: u32,
) -> DrawChunks {
    let end = splat_count.saturating_mul(VERTICES_PER_SPLAT);

    DrawChunks {
        next: 0,
        end,
        max_vertices_per_draw: if max_vertices_per_draw == 0 { end.max(1) } else { max_vertices_per_draw },
    }
}

impl Iterator for DrawChunks {
    type Item = Range<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let first = self.next;
        let count = self.max_vertices_per_draw.min(self.end - first);
        self.next = first + count;

        Some(first..self.next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next).div_ceil(self.max_vertices_per_draw) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DrawChunks {}
