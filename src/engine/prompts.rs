//! User-facing message text, collected in one place.

pub const RECEIVED_IMAGE: &str =
    "Got your image! Now send the text to overlay, or pick an option below.";
pub const WHAT_NOW: &str = "Here is your thumbnail so far. What now?";
pub const CHOOSE_OPTIONS: &str = "Choose a formatting option, or add more text.";
pub const WHAT_TEXT: &str = "What text would you like to add?";
pub const ENTER_TEXT_SIZE: &str = "Enter a text size (for example 100).";
pub const ENTER_COLOR: &str = "Enter an HTML color (for example #ff8800).";
pub const SET_HORIZONTAL_PADDING: &str = "Enter the horizontal padding in pixels.";
pub const SET_VERTICAL_PADDING: &str = "Enter the vertical padding in pixels.";
pub const SET_BORDER_THICKNESS: &str = "Enter the border thickness (for example 3).";
pub const SELECT_FONT: &str = "Select a font.";
pub const SELECT_TEXT_STYLE: &str = "Select a text style.";
pub const SELECT_HORIZONTAL_ALIGNMENT: &str = "Select a horizontal alignment.";
pub const SELECT_VERTICAL_ALIGNMENT: &str = "Select a vertical alignment.";
pub const INVALID_SIZE: &str = "That does not look like a valid size. Please send a number.";
pub const INVALID_PADDING: &str =
    "That does not look like a valid padding. Please send a whole number.";
pub const INVALID_COLOR: &str =
    "That does not look like a valid color. Please send an HTML color like #ff8800.";
pub const INVALID_CONFIGURATION: &str =
    "The configuration attached to your image could not be parsed, so it was ignored.";
pub const FINISHED: &str = "Here is your finished thumbnail!";
pub const CANCELED: &str = "Canceled. Your image and settings have been discarded.";
pub const ERROR_ENCOUNTERED: &str =
    "Something went wrong while processing that. Reply \"y\" if you would like to report the error.";
pub const ERROR_REPORTED: &str = "Thanks! The error has been reported.";
pub const CONFIGURATION_OUTPUT: &str =
    "Here is your last committed configuration. Send it as the caption of a new image to reuse it.";
pub const NO_CONFIGURATION: &str = "No configuration has been committed yet.";
