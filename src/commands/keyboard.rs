use serenity::all::{ButtonStyle, CreateActionRow, CreateButton};

use crate::models::Keyboard;

const MAX_ROWS: usize = 5;
const MAX_BUTTONS_PER_ROW: usize = 5;

/// Fit button rows into Discord's 5x5 component limit.
///
/// Layouts that already fit are kept as they are; anything larger is
/// re-flowed five per row, dropping buttons past the 25th.
pub fn layout(rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let fits = rows.len() <= MAX_ROWS && rows.iter().all(|r| r.len() <= MAX_BUTTONS_PER_ROW);
    if fits {
        return rows.into_iter().filter(|r| !r.is_empty()).collect();
    }

    let labels: Vec<String> = rows.into_iter().flatten().collect();
    labels
        .chunks(MAX_BUTTONS_PER_ROW)
        .take(MAX_ROWS)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Render a keyboard as message components; each button's id is its label
pub fn action_rows(keyboard: &Keyboard) -> Vec<CreateActionRow> {
    let Some(rows) = keyboard.rows() else {
        return Vec::new();
    };

    let style = match keyboard {
        Keyboard::DigitPad => ButtonStyle::Secondary,
        _ => ButtonStyle::Primary,
    };

    layout(rows)
        .into_iter()
        .map(|row| {
            CreateActionRow::Buttons(
                row.into_iter()
                    .map(|label| CreateButton::new(label.clone()).label(label).style(style))
                    .collect(),
            )
        })
        .collect()
}
