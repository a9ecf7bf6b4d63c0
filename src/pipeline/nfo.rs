//! Kodi style `.nfo` sidecar documents.

use crate::catalog::{Media, MediaMetadata, Source};
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

fn text_element(writer: &mut Writer<Vec<u8>>, start: BytesStart, value: &str) -> Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

fn element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    text_element(writer, BytesStart::new(name), value)
}

/// Renders the `<episodedetails>` document of a downloaded media item.
pub fn render_nfo(source: &Source, media: &Media, metadata: &MediaMetadata) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
    writer.write_event(Event::Start(BytesStart::new("episodedetails")))?;

    element(&mut writer, "title", metadata.title.as_deref().unwrap_or(&media.key))?;
    element(&mut writer, "showtitle", &source.name)?;
    if let Some(published) = media.published {
        element(&mut writer, "season", &published.format("%Y").to_string())?;
        element(&mut writer, "episode", &published.format("%m%d").to_string())?;
    }
    element(&mut writer, "plot", metadata.description.as_deref().unwrap_or_default())?;
    if let Some(uploader) = metadata.uploader.as_deref() {
        element(&mut writer, "studio", uploader)?;
    }
    if let Some(published) = media.published {
        let date = published.format("%Y-%m-%d").to_string();
        element(&mut writer, "premiered", &date)?;
        element(&mut writer, "aired", &date)?;
    }
    if let Some(duration) = metadata.duration.filter(|d| *d > 0.0) {
        let minutes = (duration / 60.0).round().max(1.0) as u64;
        element(&mut writer, "runtime", &minutes.to_string())?;
    }
    let mut unique_id = BytesStart::new("uniqueid");
    unique_id.push_attribute(("type", "youtube"));
    unique_id.push_attribute(("default", "true"));
    text_element(&mut writer, unique_id, &media.key)?;

    writer.write_event(Event::End(BytesEnd::new("episodedetails")))?;
    let mut xml = String::from_utf8(writer.into_inner()).context("NFO document is not UTF-8")?;
    xml.push('\n');
    Ok(xml)
}
