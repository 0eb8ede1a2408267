/*!
Rasterizing rendered badges to png, for places that won't show svg
*/
use resvg::{tiny_skia, usvg};
use std::sync::Arc;

use crate::se;

lazy_static::lazy_static! {
    // loading system fonts is slow, do it once per process
    static ref FONTS: Arc<usvg::fontdb::Database> = {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Arc::new(db)
    };
}

/// Render `markup` at its own size and encode it as png
pub fn svg_to_png(markup: &str) -> crate::Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb = FONTS.clone();
    let tree = usvg::Tree::from_str(markup, &opt).map_err(|e| se!("svg parse error {}", e))?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| se!("invalid png size {}x{}", size.width(), size.height()))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());
    let png = pixmap
        .encode_png()
        .map_err(|e| se!("png encode error {}", e))?;
    Ok(png)
}
