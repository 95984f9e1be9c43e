//! Speech markup helpers.
//!
//! Notifications either arrive with their own markup or as plain text. Plain
//! text is wrapped in a default `<speak><voice name="">` envelope; then the
//! selected voice is written into the first `voice` element under `speak`,
//! and the voice's content is optionally wrapped in `<prosody rate>` and
//! `<mstts:express-as style>`, in that order, so a styled and rate-adjusted
//! notification reads:
//!
//! ```text
//! <voice name="..."><mstts:express-as style="..."><prosody rate="...">text</prosody></mstts:express-as></voice>
//! ```

use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::errors::HeraldError;
use crate::types::VoiceSelection;

/// Namespace of the Microsoft TTS extensions (`express-as`).
const MSTTS_NAMESPACE: &str = "http://www.w3.org/2001/mstts";

const EXPRESS_AS: &str = "mstts:express-as";
const PROSODY: &str = "prosody";

/// Wrap plain text in the default markup envelope.
///
/// ## Examples
///
/// ```
/// let markup = herald::ssml::plain_text_markup("Fuel & cargo");
/// assert!(markup.contains("Fuel &amp; cargo"));
/// assert!(markup.contains("<voice name=\"\">"));
/// ```
pub fn plain_text_markup(text: &str) -> String {
    format!(
        r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="en-US"><voice name="">{}</voice></speak>"#,
        escape(text)
    )
}

/// Write the selected voice, rate and style into the markup.
///
/// Only the first `voice` element that is a direct child of the root `speak`
/// element is touched. Everything else is passed through unchanged.
///
/// ## Errors
///
/// Returns `HeraldError::MalformedSynthesisInput` if the markup is not
/// well-formed XML or has no `speak/voice` element.
pub fn apply_voice(markup: &str, selection: &VoiceSelection) -> Result<String, HeraldError> {
    let mut reader = Reader::from_str(markup);
    let mut writer = Writer::new(Vec::with_capacity(markup.len() + 128));

    let mut depth = 0usize;
    let mut root_is_speak = false;
    let mut open_voice_depth: Option<usize> = None;
    let mut voice_written = false;

    loop {
        match reader.read_event().map_err(HeraldError::malformed)? {
            Event::Eof => break,
            Event::Start(element) => {
                if depth == 0 {
                    root_is_speak = element.local_name().as_ref() == b"speak";
                }
                if is_target_voice(&element, depth, root_is_speak, voice_written) {
                    write(&mut writer, Event::Start(renamed_voice(&element, &selection.voice)?))?;
                    open_wrappers(&mut writer, selection)?;
                    open_voice_depth = Some(depth);
                    voice_written = true;
                } else {
                    write(&mut writer, Event::Start(element))?;
                }
                depth += 1;
            }
            Event::End(element) => {
                depth = depth.saturating_sub(1);
                if open_voice_depth == Some(depth) {
                    close_wrappers(&mut writer, selection)?;
                    open_voice_depth = None;
                }
                write(&mut writer, Event::End(element))?;
            }
            Event::Empty(element) => {
                if is_target_voice(&element, depth, root_is_speak, voice_written) {
                    let voice = renamed_voice(&element, &selection.voice)?;
                    let end = voice.to_end().into_owned();
                    write(&mut writer, Event::Start(voice))?;
                    open_wrappers(&mut writer, selection)?;
                    close_wrappers(&mut writer, selection)?;
                    write(&mut writer, Event::End(end))?;
                    voice_written = true;
                } else {
                    write(&mut writer, Event::Empty(element))?;
                }
            }
            other => write(&mut writer, other)?,
        }
    }

    if !voice_written {
        return Err(HeraldError::malformed(
            "markup has no voice element under the speak root",
        ));
    }

    String::from_utf8(writer.into_inner()).map_err(HeraldError::malformed)
}

fn is_target_voice(
    element: &BytesStart<'_>,
    depth: usize,
    root_is_speak: bool,
    already_written: bool,
) -> bool {
    depth == 1 && root_is_speak && !already_written && element.local_name().as_ref() == b"voice"
}

/// Copy the voice element with its `name` attribute replaced (or added).
fn renamed_voice(
    element: &BytesStart<'_>,
    voice: &str,
) -> Result<BytesStart<'static>, HeraldError> {
    let tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut renamed = BytesStart::new(tag);
    let mut has_name = false;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(HeraldError::malformed)?;
        if attribute.key.as_ref() == b"name" {
            renamed.push_attribute(("name", voice));
            has_name = true;
        } else {
            renamed.push_attribute(attribute);
        }
    }
    if !has_name {
        renamed.push_attribute(("name", voice));
    }

    Ok(renamed)
}

fn open_wrappers(writer: &mut Writer<Vec<u8>>, selection: &VoiceSelection) -> Result<(), HeraldError> {
    if let Some(style) = selection.style() {
        let mut express_as = BytesStart::new(EXPRESS_AS);
        express_as.push_attribute(("xmlns:mstts", MSTTS_NAMESPACE));
        express_as.push_attribute(("style", style));
        write(writer, Event::Start(express_as))?;
    }
    if let Some(rate) = selection.rate() {
        let mut prosody = BytesStart::new(PROSODY);
        prosody.push_attribute(("rate", rate));
        write(writer, Event::Start(prosody))?;
    }
    Ok(())
}

fn close_wrappers(writer: &mut Writer<Vec<u8>>, selection: &VoiceSelection) -> Result<(), HeraldError> {
    if selection.rate().is_some() {
        write(writer, Event::End(BytesEnd::new(PROSODY)))?;
    }
    if selection.style().is_some() {
        write(writer, Event::End(BytesEnd::new(EXPRESS_AS)))?;
    }
    Ok(())
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), HeraldError> {
    writer.write_event(event).map_err(HeraldError::malformed)
}
