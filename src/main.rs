use loadcanvas::error::AppResult;

fn main() -> AppResult<()> {
    loadcanvas::entry::run()
}
