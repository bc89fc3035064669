mod app;
mod components;
mod message;
mod views;

pub fn main() -> iced::Result {
    app::run()
}
