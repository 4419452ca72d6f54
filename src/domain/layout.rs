// Grid placement - first-fit positioning of new widgets
use super::widget::WidgetLayout;

/// Number of columns on the dashboard grid.
pub const GRID_COLUMNS: u32 = 12;

/// Lowest row a stored layout may start on.
pub const MAX_GRID_ROW: u32 = 10_000;

/// Tallest a stored layout may be, in rows.
pub const MAX_WIDGET_HEIGHT: u32 = 1_000;

/// Absolute ceiling on scan steps, whatever the existing layouts look like.
pub const MAX_PLACEMENT_ATTEMPTS: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

/// Find the first free slot for a `width` x `height` rectangle.
///
/// Scans row by row from `(0, 0)`, moving one column at a time and wrapping to
/// the next row once the rectangle would extend past the grid. Touching edges do
/// not count as a collision. The scan is bounded by both the grid height and
/// [`MAX_PLACEMENT_ATTEMPTS`]; if it runs out of attempts the widget is appended
/// below the lowest existing one.
pub fn find_next_position<'a, I>(width: u32, height: u32, existing: I) -> GridPosition
where
    I: IntoIterator<Item = &'a WidgetLayout>,
{
    let existing: Vec<&WidgetLayout> = existing.into_iter().collect();
    let width = width.clamp(1, GRID_COLUMNS);
    let height = height.max(1);

    let max_bottom = existing.iter().map(|l| l.bottom()).max().unwrap_or(0);
    let max_attempts = (u64::from(GRID_COLUMNS) * (u64::from(max_bottom) + 1) + 1)
        .min(MAX_PLACEMENT_ATTEMPTS);

    let (mut x, mut y) = (0u32, 0u32);
    for _ in 0..max_attempts {
        let collides = existing
            .iter()
            .any(|l| overlaps(x, y, width, height, l));
        if !collides {
            return GridPosition { x, y };
        }

        x += 1;
        if x + width > GRID_COLUMNS {
            x = 0;
            y += 1;
        }
    }

    tracing::warn!(
        width,
        height,
        existing = existing.len(),
        "placement scan exhausted, appending below lowest widget"
    );
    GridPosition { x: 0, y: max_bottom }
}

fn overlaps(x: u32, y: u32, w: u32, h: u32, other: &WidgetLayout) -> bool {
    x < other.x.saturating_add(other.w)
        && x.saturating_add(w) > other.x
        && y < other.bottom()
        && y.saturating_add(h) > other.y
}
