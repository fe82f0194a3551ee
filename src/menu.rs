#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub id: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
        }
    }
}

/// Transport-neutral inline menu: rows of labeled, identifier-bearing
/// buttons. The chat client maps this onto its own keyboard markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub rows: Vec<Vec<MenuButton>>,
}

impl Menu {
    pub fn row(buttons: Vec<MenuButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }

    pub fn grid(buttons: Vec<MenuButton>, columns: usize) -> Self {
        let columns = columns.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::new();
        for button in buttons {
            row.push(button);
            if row.len() == columns {
                rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }
}

/// Every action reachable from the inline menus, keyed by a stable string
/// identifier carried in the button callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    AddText,
    SetText,
    ChooseFont,
    ChooseTextStyle,
    ChooseTextSize,
    ChooseHorizontalAlignment,
    ChooseVerticalAlignment,
    SetHorizontalPadding,
    SetVerticalPadding,
    ChooseTextColor,
    ChooseBorderColor,
    SetBorderThickness,
    ExportConfiguration,
    Cancel,
    Done,
}

impl MenuAction {
    pub const ALL: [MenuAction; 15] = [
        MenuAction::AddText,
        MenuAction::SetText,
        MenuAction::ChooseFont,
        MenuAction::ChooseTextStyle,
        MenuAction::ChooseTextSize,
        MenuAction::ChooseHorizontalAlignment,
        MenuAction::ChooseVerticalAlignment,
        MenuAction::SetHorizontalPadding,
        MenuAction::SetVerticalPadding,
        MenuAction::ChooseTextColor,
        MenuAction::ChooseBorderColor,
        MenuAction::SetBorderThickness,
        MenuAction::ExportConfiguration,
        MenuAction::Cancel,
        MenuAction::Done,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            MenuAction::AddText => "add-text",
            MenuAction::SetText => "set-text",
            MenuAction::ChooseFont => "choose-font",
            MenuAction::ChooseTextStyle => "choose-text-style",
            MenuAction::ChooseTextSize => "choose-text-size",
            MenuAction::ChooseHorizontalAlignment => "choose-horizontal-alignment",
            MenuAction::ChooseVerticalAlignment => "choose-vertical-alignment",
            MenuAction::SetHorizontalPadding => "set-horizontal-padding",
            MenuAction::SetVerticalPadding => "set-vertical-padding",
            MenuAction::ChooseTextColor => "choose-text-color",
            MenuAction::ChooseBorderColor => "choose-border-color",
            MenuAction::SetBorderThickness => "set-border-thickness",
            MenuAction::ExportConfiguration => "export-configuration",
            MenuAction::Cancel => "cancel",
            MenuAction::Done => "done",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::AddText => "Add text",
            MenuAction::SetText => "Set text",
            MenuAction::ChooseFont => "Choose font",
            MenuAction::ChooseTextStyle => "Choose text style",
            MenuAction::ChooseTextSize => "Choose text size",
            MenuAction::ChooseHorizontalAlignment => "Choose horizontal alignment",
            MenuAction::ChooseVerticalAlignment => "Choose vertical alignment",
            MenuAction::SetHorizontalPadding => "Set horizontal padding",
            MenuAction::SetVerticalPadding => "Set vertical padding",
            MenuAction::ChooseTextColor => "Choose text color",
            MenuAction::ChooseBorderColor => "Choose border color",
            MenuAction::SetBorderThickness => "Set border thickness",
            MenuAction::ExportConfiguration => "Export configuration",
            MenuAction::Cancel => "Cancel",
            MenuAction::Done => "Done",
        }
    }

    pub fn from_id(id: &str) -> Option<MenuAction> {
        MenuAction::ALL.into_iter().find(|action| action.id() == id)
    }

    fn button(&self) -> MenuButton {
        MenuButton::new(self.label(), self.id())
    }
}

/// The top-level menu shown with every rendered thumbnail.
pub fn main_menu() -> Menu {
    Menu::grid(
        vec![
            MenuAction::AddText.button(),
            MenuAction::Cancel.button(),
            MenuAction::Done.button(),
            MenuAction::ExportConfiguration.button(),
        ],
        3,
    )
}

/// The formatting sub-menu, re-shown after every successful field update.
pub fn formatting_menu() -> Menu {
    Menu::grid(
        vec![
            MenuAction::ChooseFont.button(),
            MenuAction::ChooseTextStyle.button(),
            MenuAction::ChooseTextSize.button(),
            MenuAction::ChooseHorizontalAlignment.button(),
            MenuAction::ChooseVerticalAlignment.button(),
            MenuAction::SetHorizontalPadding.button(),
            MenuAction::SetVerticalPadding.button(),
            MenuAction::ChooseTextColor.button(),
            MenuAction::ChooseBorderColor.button(),
            MenuAction::SetBorderThickness.button(),
            MenuAction::SetText.button(),
            MenuAction::Cancel.button(),
        ],
        1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_ids_round_trip() {
        for action in MenuAction::ALL {
            assert_eq!(MenuAction::from_id(action.id()), Some(action));
        }
    }

    #[test]
    fn action_ids_are_unique() {
        let mut ids: Vec<&str> = MenuAction::ALL.iter().map(|action| action.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MenuAction::ALL.len());
    }

    #[test]
    fn unknown_id_maps_to_none() {
        assert_eq!(MenuAction::from_id("no-such-action"), None);
    }

    #[test]
    fn grid_chunks_buttons_into_rows() {
        let menu = main_menu();
        assert_eq!(menu.rows.len(), 2);
        assert_eq!(menu.rows[0].len(), 3);
        assert_eq!(menu.rows[1].len(), 1);
    }

    #[test]
    fn formatting_menu_is_one_column() {
        let menu = formatting_menu();
        assert_eq!(menu.rows.len(), 12);
        assert!(menu.rows.iter().all(|row| row.len() == 1));
    }
}
