//! FETCH and UID FETCH command handler.
//!
//! This is the most complex IMAP response because it uses **counted
//! literals** to transfer message content. The format is:
//!
//! ```text
//! * <seq> FETCH (UID <uid> BODY[] {<length>}
//! <exactly length bytes of raw RFC 2822 message>
//! )
//! ```
//!
//! The `{length}\r\n` is an IMAP literal marker. It tells the client:
//! "the next `length` bytes are raw data, not IMAP protocol text."
//! After reading those bytes, the client expects the rest of the item
//! list and the closing `)`.
//!
//! Fetching `BODY[...]`, `RFC822` or `RFC822.TEXT` marks the message
//! `\Seen` unless the mailbox was opened with EXAMINE. The new flags
//! are then reported even when FLAGS was not requested.

use super::tagged_error;
use crate::flag::{Flag, FlagSet, StoreMode, to_imap_list};
use crate::imap::sequence::{Addressing, resolve};
use crate::imap::state::Selection;
use crate::imap::view::{MessageView, internal_date, literal};
use crate::io::{write_bytes, write_line};
use crate::store::{Message, MessageStore};
use imap_codec::imap_types::core::AString;
use imap_codec::imap_types::fetch::{
    MacroOrMessageDataItemNames, MessageDataItemName, Part, Section,
};
use imap_codec::imap_types::sequence::SequenceSet;
use std::num::NonZeroU32;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle FETCH, or UID FETCH when `uid` is set.
pub async fn handle_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    items: &MacroOrMessageDataItemNames<'_>,
    uid: bool,
    selection: &Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let mut items: Vec<MessageDataItemName<'_>> = match items {
        MacroOrMessageDataItemNames::Macro(m) => m.expand(),
        MacroOrMessageDataItemNames::MessageDataItemNames(items) => items.clone(),
    };
    // RFC 3501 Section 6.4.8: UID FETCH always reports the UID
    if uid && !items.contains(&MessageDataItemName::Uid) {
        items.insert(0, MessageDataItemName::Uid);
    }

    let mailbox = selection.mailbox.as_str();
    let live = match store.list_messages(&selection.principal, mailbox) {
        Ok(live) => live,
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };
    let view = selection.view(&live);
    let addressing = Addressing::from_uid_flag(uid);
    let indices = match resolve(sequence_set, &selection.known_uids, addressing) {
        Ok(indices) => indices,
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };

    let marks_seen = !selection.read_only && items.iter().any(sets_seen);
    let seen: FlagSet = [Flag::Seen].into_iter().collect();

    for idx in indices {
        // Expunged elsewhere and not reported yet: nothing to send.
        let Some(message) = view[idx] else {
            continue;
        };
        let mut message = message.clone();
        let mut report_flags = false;
        if marks_seen && !message.has_flag(&Flag::Seen) {
            // Expunged by another session in the meantime: serve the
            // snapshot without touching the flags.
            if let Ok(flags) = store.set_flags(
                &selection.principal,
                mailbox,
                message.uid,
                StoreMode::Add,
                &seen,
            ) {
                message.flags = flags;
                report_flags = !items.contains(&MessageDataItemName::Flags);
            }
        }

        let mut out = format!("* {} FETCH (", idx + 1).into_bytes();
        let mut rendered: Vec<Vec<u8>> = items
            .iter()
            .filter_map(|item| render(item, &message))
            .collect();
        if report_flags {
            rendered.push(format!("FLAGS {}", to_imap_list(&message.flags)).into_bytes());
        }
        out.extend(rendered.join(&b' '));
        out.extend_from_slice(b")\r\n");
        write_bytes(stream, &out).await?;
    }

    let command = if uid { "UID FETCH" } else { "FETCH" };
    let resp = format!("{tag} OK {command} completed\r\n");
    write_line(stream, &resp).await
}

const fn sets_seen(item: &MessageDataItemName<'_>) -> bool {
    matches!(
        item,
        MessageDataItemName::BodyExt { peek: false, .. }
            | MessageDataItemName::Rfc822
            | MessageDataItemName::Rfc822Text
    )
}

/// One `NAME value` pair of the FETCH response, or `None` for items
/// the server does not produce.
fn render(item: &MessageDataItemName<'_>, message: &Message) -> Option<Vec<u8>> {
    let view = MessageView::new(&message.raw);

    let (name, mut value) = match item {
        MessageDataItemName::Uid => (b"UID".to_vec(), message.uid.to_string().into_bytes()),
        MessageDataItemName::Flags => {
            (b"FLAGS".to_vec(), to_imap_list(&message.flags).into_bytes())
        }
        MessageDataItemName::InternalDate => {
            (b"INTERNALDATE".to_vec(), internal_date(&message.received).into_bytes())
        }
        MessageDataItemName::Rfc822Size => {
            (b"RFC822.SIZE".to_vec(), message.size().to_string().into_bytes())
        }
        MessageDataItemName::Envelope => (b"ENVELOPE".to_vec(), view.envelope()),
        MessageDataItemName::Body => (b"BODY".to_vec(), view.body_structure(false)),
        MessageDataItemName::BodyStructure => {
            (b"BODYSTRUCTURE".to_vec(), view.body_structure(true))
        }
        MessageDataItemName::Rfc822 => (b"RFC822".to_vec(), literal(&message.raw)),
        MessageDataItemName::Rfc822Header => (b"RFC822.HEADER".to_vec(), literal(view.header())),
        MessageDataItemName::Rfc822Text => (b"RFC822.TEXT".to_vec(), literal(view.text())),
        MessageDataItemName::BodyExt {
            section, partial, ..
        } => {
            let content = section_content(&view, section.as_ref());
            let mut name = format!("BODY[{}]", section_name(section.as_ref()));
            let content = match partial {
                Some((origin, length)) => {
                    name.push_str(&format!("<{origin}>"));
                    slice(&content, *origin, *length)
                }
                None => content.as_slice(),
            };
            (name.into_bytes(), literal(content))
        }
        _ => return None,
    };

    let mut out = name;
    out.push(b' ');
    out.append(&mut value);
    Some(out)
}

fn slice(content: &[u8], origin: u32, length: NonZeroU32) -> &[u8] {
    let start = (origin as usize).min(content.len());
    let end = start.saturating_add(length.get() as usize).min(content.len());
    &content[start..end]
}

/// The bytes a section addresses. A non-multipart message has a
/// single part, numbered 1, holding the body text.
fn section_content(view: &MessageView<'_>, section: Option<&Section<'_>>) -> Vec<u8> {
    match section {
        None => [view.header(), view.text()].concat(),
        Some(Section::Part(part)) if is_first_part(part) => view.text().to_vec(),
        Some(Section::Header(None)) => view.header().to_vec(),
        Some(Section::HeaderFields(None, names)) => {
            view.header_subset(&field_names(names.as_ref()), false)
        }
        Some(Section::HeaderFieldsNot(None, names)) => {
            view.header_subset(&field_names(names.as_ref()), true)
        }
        Some(Section::Text(None)) => view.text().to_vec(),
        Some(Section::Mime(part)) if is_first_part(part) => view.header().to_vec(),
        Some(_) => Vec::new(),
    }
}

fn is_first_part(part: &Part) -> bool {
    part.0.as_ref().iter().map(|n| n.get()).eq([1])
}

fn field_names(names: &[AString<'_>]) -> Vec<String> {
    names
        .iter()
        .map(|n| {
            let bytes: &[u8] = n.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        })
        .collect()
}

/// The section text echoed back inside `BODY[...]`.
fn section_name(section: Option<&Section<'_>>) -> String {
    let part = |part: &Part| {
        let numbers: Vec<String> = part.0.as_ref().iter().map(ToString::to_string).collect();
        numbers.join(".")
    };
    let prefixed = |p: Option<&Part>, text: &str| match p {
        Some(p) => format!("{}.{text}", part(p)),
        None => text.to_string(),
    };
    let list = |names: &[AString<'_>]| field_names(names).join(" ");

    match section {
        None => String::new(),
        Some(Section::Part(p)) => part(p),
        Some(Section::Header(p)) => prefixed(p.as_ref(), "HEADER"),
        Some(Section::HeaderFields(p, names)) => {
            prefixed(p.as_ref(), &format!("HEADER.FIELDS ({})", list(names.as_ref())))
        }
        Some(Section::HeaderFieldsNot(p, names)) => {
            prefixed(p.as_ref(), &format!("HEADER.FIELDS.NOT ({})", list(names.as_ref())))
        }
        Some(Section::Text(p)) => prefixed(p.as_ref(), "TEXT"),
        Some(Section::Mime(p)) => format!("{}.MIME", part(p)),
    }
}
