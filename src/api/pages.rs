// Static HTML served by the authorization server

macro_rules! page {
    ($title:literal, $heading:literal) => {
        concat!(
            "<html><head><title>",
            $title,
            "</title><style>",
            "body { font-family: Arial, sans-serif; display: flex; justify-content: center; ",
            "align-items: center; height: 100vh; margin: 0; background-color: #f5f5f5; } ",
            "h1 { color: #333; text-align: center; }",
            "</style></head><body><h1>",
            $heading,
            "</h1></body></html>"
        )
    };
}

pub const WELCOME_PAGE: &str = page!(
    "Google Calendar OAuth Server",
    "Google Calendar OAuth server. Go to <a href=\"/oauth/\">/oauth/</a> to authorize."
);

pub const SUCCESS_PAGE: &str = page!(
    "Success",
    "Google OAuth2 successful. Start the calendar MCP server."
);

pub const LOGOUT_PAGE: &str = page!("Signed out", "Session removed.");
