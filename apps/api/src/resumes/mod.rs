// Resume uploads: text extraction on the way in, then listing and deletion.
// Generation over a stored resume lives in `generation::tailor`.

pub mod extraction;
pub mod handlers;
