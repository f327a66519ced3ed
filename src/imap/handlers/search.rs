//! SEARCH and UID SEARCH command handler.
//!
//! Matches messages against parsed `SearchKey` criteria from
//! imap-types. Several keys are an implicit AND. Text keys match
//! case-insensitive substrings. `BEFORE`, `ON` and `SINCE` compare the
//! arrival date; the `SENT*` keys compare the `Date:` header, and a
//! message without a parseable `Date:` never matches them.
//!
//! The response format (RFC 3501 Section 7.2.5):
//!
//! ```text
//! * SEARCH 1 2 3
//! A0003 OK SEARCH completed
//! ```
//!
//! Plain SEARCH answers with positions, UID SEARCH with UIDs.

use super::tagged_error;
use crate::flag::Flag;
use crate::imap::sequence::{Addressing, contains};
use crate::imap::state::Selection;
use crate::imap::view::MessageView;
use crate::io::write_line;
use crate::store::{Message, MessageStore};
use imap_codec::imap_types::core::AString;
use imap_codec::imap_types::search::SearchKey;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle SEARCH, or UID SEARCH when `uid` is set.
pub async fn handle_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[SearchKey<'_>],
    uid: bool,
    selection: &Selection,
    store: &MessageStore,
    stream: &mut BufReader<S>,
) -> std::io::Result<()> {
    let live = match store.list_messages(&selection.principal, selection.mailbox.as_str()) {
        Ok(live) => live,
        Err(e) => return write_line(stream, &tagged_error(tag, &e)).await,
    };

    // Messages expunged elsewhere but still in the view never match.
    let known = &selection.known_uids;
    let hits: Vec<String> = selection
        .view(&live)
        .into_iter()
        .enumerate()
        .filter_map(|(idx, m)| m.map(|m| (idx, m)))
        .filter(|(idx, m)| criteria.iter().all(|key| matches_key(known, *idx, m, key)))
        .map(|(idx, m)| if uid { m.uid.to_string() } else { (idx + 1).to_string() })
        .collect();

    let mut line = String::from("* SEARCH");
    for hit in &hits {
        line.push(' ');
        line.push_str(hit);
    }
    line.push_str("\r\n");
    write_line(stream, &line).await?;

    let command = if uid { "UID SEARCH" } else { "SEARCH" };
    let resp = format!("{tag} OK {command} completed\r\n");
    write_line(stream, &resp).await
}

/// Check if `message`, at index `idx` of the known UIDs, matches a
/// single `SearchKey`.
#[allow(clippy::match_same_arms)]
fn matches_key(known: &[u32], idx: usize, message: &Message, key: &SearchKey<'_>) -> bool {
    let view = MessageView::new(&message.raw);
    let received = message.received.date_naive();

    match key {
        SearchKey::All => true,
        SearchKey::And(keys) => keys.as_ref().iter().all(|k| matches_key(known, idx, message, k)),
        SearchKey::Or(a, b) => {
            matches_key(known, idx, message, a) || matches_key(known, idx, message, b)
        }
        SearchKey::Not(k) => !matches_key(known, idx, message, k),
        SearchKey::SequenceSet(set) => contains(set, known, idx, Addressing::Position),
        SearchKey::Uid(set) => contains(set, known, idx, Addressing::Uid),

        SearchKey::Answered => message.has_flag(&Flag::Answered),
        SearchKey::Unanswered => !message.has_flag(&Flag::Answered),
        SearchKey::Deleted => message.has_flag(&Flag::Deleted),
        SearchKey::Undeleted => !message.has_flag(&Flag::Deleted),
        SearchKey::Draft => message.has_flag(&Flag::Draft),
        SearchKey::Undraft => !message.has_flag(&Flag::Draft),
        SearchKey::Flagged => message.has_flag(&Flag::Flagged),
        SearchKey::Unflagged => !message.has_flag(&Flag::Flagged),
        SearchKey::Seen => message.has_flag(&Flag::Seen),
        SearchKey::Unseen => !message.has_flag(&Flag::Seen),
        SearchKey::Keyword(atom) => message.has_flag(&Flag::parse(atom.as_ref())),
        SearchKey::Unkeyword(atom) => !message.has_flag(&Flag::parse(atom.as_ref())),
        // No session ever sees a message as recent.
        SearchKey::Recent | SearchKey::New => false,
        SearchKey::Old => true,

        SearchKey::Before(date) => received < *date.as_ref(),
        SearchKey::On(date) => received == *date.as_ref(),
        SearchKey::Since(date) => received >= *date.as_ref(),
        SearchKey::SentBefore(date) => view.sent_day().is_some_and(|d| d < *date.as_ref()),
        SearchKey::SentOn(date) => view.sent_day().is_some_and(|d| d == *date.as_ref()),
        SearchKey::SentSince(date) => view.sent_day().is_some_and(|d| d >= *date.as_ref()),

        SearchKey::Larger(n) => message.size() > *n as usize,
        SearchKey::Smaller(n) => message.size() < *n as usize,

        SearchKey::From(s) => field_contains(&view, "From", s),
        SearchKey::To(s) => field_contains(&view, "To", s),
        SearchKey::Cc(s) => field_contains(&view, "Cc", s),
        SearchKey::Bcc(s) => field_contains(&view, "Bcc", s),
        SearchKey::Subject(s) => field_contains(&view, "Subject", s),
        SearchKey::Header(name, s) => field_contains(&view, &text_of(name), s),
        SearchKey::Body(s) => bytes_contain(view.text(), s),
        SearchKey::Text(s) => bytes_contain(&message.raw, s),
    }
}

fn text_of(value: &AString<'_>) -> String {
    let bytes: &[u8] = value.as_ref();
    String::from_utf8_lossy(bytes).into_owned()
}

/// Whether any field called `name` contains `needle`. An empty needle
/// matches any message that has the field at all.
fn field_contains(view: &MessageView<'_>, name: &str, needle: &AString<'_>) -> bool {
    let needle = text_of(needle).to_lowercase();
    view.fields()
        .iter()
        .filter(|f| f.name.eq_ignore_ascii_case(name))
        .any(|f| f.value.to_lowercase().contains(&needle))
}

fn bytes_contain(haystack: &[u8], needle: &AString<'_>) -> bool {
    let needle = text_of(needle).to_lowercase();
    String::from_utf8_lossy(haystack).to_lowercase().contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{FlagSet, StoreMode};
    use crate::imap::handlers::testing::{RAW, inbox_selection, output, store_with};
    use chrono::{NaiveDate, Utc};
    use imap_codec::imap_types::datetime::NaiveDate as ImapDate;
    use imap_codec::imap_types::sequence::SequenceSet;

    fn make_dated_email(date: &str, subject: &str) -> String {
        format!(
            "From: Alice <alice@example.com>\r\n\
             To: bob@example.com\r\n\
             Date: {date}\r\n\
             Subject: {subject}\r\n\
             \r\n\
             Body"
        )
    }

    async fn run(tag: &str, criteria: &[SearchKey<'_>], uid: bool, store: &MessageStore) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        let selection = inbox_selection(store, false);

        handle_search(tag, criteria, uid, &selection, store, &mut stream)
            .await
            .unwrap();
        drop(stream);
        output(client).await
    }

    fn date(y: i32, m: u32, d: u32) -> ImapDate {
        ImapDate::try_from(NaiveDate::from_ymd_opt(y, m, d).unwrap()).unwrap()
    }

    fn astring(s: &str) -> AString<'_> {
        AString::try_from(s).unwrap()
    }

    fn mark(store: &MessageStore, uid: u32, flag: Flag) {
        let flags: FlagSet = [flag].into_iter().collect();
        store.set_flags("foo", "INBOX", uid, StoreMode::Add, &flags).unwrap();
    }

    #[tokio::test]
    async fn search_all_returns_positions() {
        let store = store_with(&[RAW, RAW, RAW]);
        let output = run("A1", &[SearchKey::All], false, &store).await;

        assert_eq!(output, "* SEARCH 1 2 3\r\nA1 OK SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn uid_search_returns_uids() {
        let store = store_with(&[RAW, RAW, RAW]);
        mark(&store, 1, Flag::Deleted);
        store.expunge("foo", "INBOX").unwrap();

        let output = run("A1", &[SearchKey::All], true, &store).await;
        assert_eq!(output, "* SEARCH 2 3\r\nA1 OK UID SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn positions_follow_the_session_view() {
        let store = store_with(&[RAW, RAW, RAW]);
        let selection = inbox_selection(&store, false);
        mark(&store, 2, Flag::Deleted);
        store.expunge("foo", "INBOX").unwrap();

        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        handle_search("A1", &[SearchKey::All], false, &selection, &store, &mut stream)
            .await
            .unwrap();
        drop(stream);

        assert_eq!(output(client).await, "* SEARCH 1 3\r\nA1 OK SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn empty_result_has_no_trailing_space() {
        let store = store_with(&[]);
        let output = run("A1", &[SearchKey::All], false, &store).await;

        assert_eq!(output, "* SEARCH\r\nA1 OK SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn flag_keys() {
        let store = store_with(&[RAW, RAW, RAW]);
        mark(&store, 1, Flag::Seen);
        mark(&store, 3, Flag::Seen);
        mark(&store, 3, Flag::Flagged);

        assert!(run("A1", &[SearchKey::Unseen], false, &store).await.starts_with("* SEARCH 2\r\n"));
        let both = [SearchKey::Seen, SearchKey::Unflagged];
        assert!(run("A2", &both, false, &store).await.starts_with("* SEARCH 1\r\n"));
    }

    #[tokio::test]
    async fn or_and_not() {
        let store = store_with(&[RAW, RAW, RAW]);
        mark(&store, 2, Flag::Answered);
        mark(&store, 3, Flag::Draft);

        let or = SearchKey::Or(Box::new(SearchKey::Answered), Box::new(SearchKey::Draft));
        assert!(run("A1", &[or], false, &store).await.starts_with("* SEARCH 2 3\r\n"));

        let not = SearchKey::Not(Box::new(SearchKey::Answered));
        assert!(run("A2", &[not], false, &store).await.starts_with("* SEARCH 1 3\r\n"));
    }

    #[tokio::test]
    async fn sequence_and_uid_sets() {
        let store = store_with(&[RAW, RAW, RAW, RAW]);
        let set = SequenceSet::try_from("2:3").unwrap();

        let output = run("A1", &[SearchKey::SequenceSet(set.clone())], false, &store).await;
        assert!(output.starts_with("* SEARCH 2 3\r\n"));

        let output = run("A2", &[SearchKey::Uid(set)], true, &store).await;
        assert!(output.starts_with("* SEARCH 2 3\r\n"));
    }

    #[tokio::test]
    async fn header_text_keys_ignore_case() {
        let weekly = make_dated_email("Mon, 01 Jan 2024 10:00:00 +0000", "Weekly Report");
        let lunch = make_dated_email("Mon, 01 Jan 2024 10:00:00 +0000", "Lunch");
        let store = store_with(&[weekly.as_str(), lunch.as_str()]);

        let subject = [SearchKey::Subject(astring("report"))];
        assert!(run("A1", &subject, false, &store).await.starts_with("* SEARCH 1\r\n"));

        let from = [SearchKey::From(astring("ALICE"))];
        assert!(run("A2", &from, false, &store).await.starts_with("* SEARCH 1 2\r\n"));

        let header = [SearchKey::Header(astring("to"), astring("bob@"))];
        assert!(run("A3", &header, false, &store).await.starts_with("* SEARCH 1 2\r\n"));

        let text = [SearchKey::Text(astring("lunch"))];
        assert!(run("A4", &text, false, &store).await.starts_with("* SEARCH 2\r\n"));

        let body = [SearchKey::Body(astring("lunch"))];
        assert!(run("A5", &body, false, &store).await.starts_with("* SEARCH\r\n"));
    }

    #[tokio::test]
    async fn sent_dates_use_date_header() {
        let jan1 = make_dated_email("Mon, 01 Jan 2024 10:00:00 +0000", "a");
        let jan10 = make_dated_email("Wed, 10 Jan 2024 10:00:00 +0000", "b");
        let store = store_with(&[jan1.as_str(), jan10.as_str(), RAW]);

        let since = [SearchKey::SentSince(date(2024, 1, 10))];
        assert!(run("A1", &since, false, &store).await.starts_with("* SEARCH 2\r\n"));

        let before = [SearchKey::SentBefore(date(2024, 1, 10))];
        assert!(run("A2", &before, false, &store).await.starts_with("* SEARCH 1\r\n"));

        let on = [SearchKey::SentOn(date(2024, 1, 1))];
        assert!(run("A3", &on, false, &store).await.starts_with("* SEARCH 1\r\n"));
    }

    #[tokio::test]
    async fn arrival_dates_use_internal_date() {
        let store = store_with(&[RAW]);
        let today = Utc::now().date_naive();
        let today = ImapDate::try_from(today).unwrap();

        let on = [SearchKey::On(today)];
        let output = run("A1", &on, false, &store).await;
        // Tolerate a run that crosses midnight.
        assert!(output.starts_with("* SEARCH 1\r\n") || output.starts_with("* SEARCH\r\n"));

        let before = [SearchKey::Before(date(2000, 1, 1))];
        assert!(run("A2", &before, false, &store).await.starts_with("* SEARCH\r\n"));

        let since = [SearchKey::Since(date(2000, 1, 1))];
        assert!(run("A3", &since, false, &store).await.starts_with("* SEARCH 1\r\n"));
    }

    #[tokio::test]
    async fn size_keys() {
        let store = store_with(&[RAW, "x"]);
        let larger = [SearchKey::Larger(10)];
        assert!(run("A1", &larger, false, &store).await.starts_with("* SEARCH 1\r\n"));
        let smaller = [SearchKey::Smaller(10)];
        assert!(run("A2", &smaller, false, &store).await.starts_with("* SEARCH 2\r\n"));
    }
}
