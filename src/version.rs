pub const VERSION: &str = "0.1.0";
pub const AUTHOR: &str = "Richo Healey <richo@psych0tik.net>";
