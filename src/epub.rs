use std::fs;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use chrono::Utc;
use zip::write::SimpleFileOptions;

/// Package-level metadata written into `content.opf`.
#[derive(Debug, Clone)]
pub struct BookMeta {
    pub identifier: String,
    pub title: String,
    /// BCP-47 language tag used for EPUB metadata and XHTML documents.
    pub lang: String,
    pub author: String,
}

/// One assembled chapter: filename already assigned by the chapter mapping,
/// html already link-rewritten.
#[derive(Debug)]
pub struct Chapter {
    pub filename: String,
    pub title: String,
    pub html: String,
}

pub fn write_epub(
    out_path: &Path,
    meta: &BookMeta,
    chapters: &[Chapter],
    force: bool,
) -> anyhow::Result<()> {
    if chapters.is_empty() {
        anyhow::bail!("no chapters to package");
    }
    if out_path.exists() && !force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create epub parent dir: {}", parent.display()))?;
    }

    let lang = meta.lang.trim();
    let lang = if lang.is_empty() { "und" } else { lang };

    let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let container_xml = render_container_xml();
    let css = default_style_css();
    let nav_xhtml = render_nav_xhtml(&meta.title, lang, chapters);
    let toc_ncx = render_toc_ncx(&meta.title, &meta.identifier, chapters);
    let content_opf = render_content_opf(meta, lang, &modified, chapters);

    let mut out_options = OpenOptions::new();
    out_options.write(true);
    if force {
        out_options.create(true).truncate(true);
    } else {
        out_options.create_new(true);
    }
    let out_file = out_options
        .open(out_path)
        .with_context(|| format!("open epub output: {}", out_path.display()))?;

    let mut zip = zip::ZipWriter::new(out_file);

    // Per EPUB spec, `mimetype` MUST be the first entry and MUST be stored (no compression).
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(b"application/epub+zip")
        .context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip.start_file("META-INF/container.xml", deflated_options)
        .context("epub start_file container.xml")?;
    zip.write_all(container_xml.as_bytes())
        .context("epub write container.xml")?;

    zip.start_file("OEBPS/content.opf", deflated_options)
        .context("epub start_file content.opf")?;
    zip.write_all(content_opf.as_bytes())
        .context("epub write content.opf")?;

    zip.start_file("OEBPS/nav.xhtml", deflated_options)
        .context("epub start_file nav.xhtml")?;
    zip.write_all(nav_xhtml.as_bytes())
        .context("epub write nav.xhtml")?;

    zip.start_file("OEBPS/toc.ncx", deflated_options)
        .context("epub start_file toc.ncx")?;
    zip.write_all(toc_ncx.as_bytes())
        .context("epub write toc.ncx")?;

    zip.start_file("OEBPS/style.css", deflated_options)
        .context("epub start_file style.css")?;
    zip.write_all(css.as_bytes())
        .context("epub write style.css")?;

    for chapter in chapters {
        let html = ensure_xhtml_void_tags(&chapter.html);
        let xhtml = wrap_xhtml_document(&chapter.title, lang, &html);

        zip.start_file(format!("OEBPS/{}", chapter.filename), deflated_options)
            .with_context(|| format!("epub start_file chapter: {}", chapter.filename))?;
        zip.write_all(xhtml.as_bytes())
            .with_context(|| format!("epub write chapter: {}", chapter.filename))?;
    }

    zip.finish().context("epub finish zip")?;
    Ok(())
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> String {
    r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
img { max-width: 100%; height: auto; }
pre, code { font-family: ui-monospace, Menlo, Consolas, monospace; }
pre { overflow-x: auto; padding: 0.75em; background: #f6f8fa; border-radius: 6px; }
blockquote { margin: 1em 0; padding: 0 1em; border-left: 4px solid #ddd; color: #333; }
"#
    .to_string()
}

fn render_nav_xhtml(title: &str, lang: &str, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{}</h1>\n", xml_escape(title)));
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for chapter in chapters {
        out.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            xml_escape(&chapter.filename),
            xml_escape(&chapter.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(title: &str, identifier: &str, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
    );
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\" />\n",
        xml_escape(identifier)
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\" />\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\" />\n");
    out.push_str("  </head>\n");
    out.push_str("  <docTitle><text>");
    out.push_str(&xml_escape(title));
    out.push_str("</text></docTitle>\n");
    out.push_str("  <navMap>\n");
    for (idx, chapter) in chapters.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{}\" playOrder=\"{}\">\n",
            play, play
        ));
        out.push_str("      <navLabel><text>");
        out.push_str(&xml_escape(&chapter.title));
        out.push_str("</text></navLabel>\n");
        out.push_str(&format!(
            "      <content src=\"{}\" />\n",
            xml_escape(&chapter.filename)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn render_content_opf(meta: &BookMeta, lang: &str, modified: &str, chapters: &[Chapter]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(lang)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">{}</dc:identifier>\n",
        xml_escape(&meta.identifier)
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&meta.title)
    ));
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(lang)
    ));
    out.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        xml_escape(&meta.author)
    ));
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(modified)
    ));
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");

    for (idx, chapter) in chapters.iter().enumerate() {
        out.push_str(&format!(
            "    <item id=\"chapter-{}\" href=\"{}\" media-type=\"application/xhtml+xml\" />\n",
            idx + 1,
            xml_escape(&chapter.filename)
        ));
    }

    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\">\n");
    // Reading order: the navigation page first, then every chapter.
    out.push_str("    <itemref idref=\"nav\" />\n");
    for idx in 0..chapters.len() {
        out.push_str(&format!("    <itemref idref=\"chapter-{}\" />\n", idx + 1));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn ensure_xhtml_void_tags(html: &str) -> String {
    // Convert void tags like `<img ...>` into `<img ... />` to keep EPUB XHTML well-formed.
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;

        // Copy text before the tag (keeps UTF-8 intact).
        out.push_str(&html[cursor..lt]);

        // Find end of the tag `>` while respecting quotes.
        let mut in_quote: Option<u8> = None;
        let mut gt = lt + 1;
        while gt < bytes.len() {
            let b = bytes[gt];
            if let Some(q) = in_quote {
                if b == q {
                    in_quote = None;
                }
                gt += 1;
                continue;
            }
            if b == b'"' || b == b'\'' {
                in_quote = Some(b);
                gt += 1;
                continue;
            }
            if b == b'>' {
                break;
            }
            gt += 1;
        }
        if gt >= bytes.len() {
            // Malformed HTML; copy the rest as-is.
            out.push_str(&html[lt..]);
            return out;
        }

        let raw_tag = &html[lt..=gt];

        // Keep comments/doctype/processing instructions/end tags as-is.
        if raw_tag
            .as_bytes()
            .get(1)
            .is_some_and(|b| matches!(b, b'!' | b'?' | b'/'))
        {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        // Parse tag name.
        let name_start = lt + 1;
        let mut name_end = name_start;
        while name_end < gt && (bytes[name_end] as char).is_ascii_alphabetic() {
            name_end += 1;
        }
        if name_end == name_start {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        let tag_name = &html[name_start..name_end];
        let tag_name_lower = tag_name.to_ascii_lowercase();
        if !VOID_TAGS.contains(&tag_name_lower.as_str()) {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        let tag_without_gt = &html[lt..gt];
        let already_self_closed = tag_without_gt.trim_end().ends_with('/');
        if already_self_closed {
            out.push_str(raw_tag);
        } else {
            out.push_str(tag_without_gt);
            out.push_str(" />");
        }

        cursor = gt + 1;
    }

    out.push_str(&html[cursor..]);
    out
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
