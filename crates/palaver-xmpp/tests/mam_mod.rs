// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use anyhow::Result;
use jid::BareJid;
use minidom::Element;
use pretty_assertions::assert_eq;

use palaver_xmpp::test::{BareJidTestAdditions, ClientTestAdditions, ConnectedClient};
use palaver_xmpp::{mods, ns, Client};

const CHRISTMAS_GREETING: &str = r#"<message xmlns="jabber:client" type="chat" id="m1" from="friend@prose.org/phone" to="test@prose.org/test">
    <body>Merry Christmas</body>
</message>"#;

/// Answers the archive query `query_iq` with `results`, given as pairs of archive id and
/// forwarded message, followed by the `<fin/>`.
fn archive_response(query_iq: &Element, results: &[(&str, &str)], complete: bool) -> Vec<Element> {
    let Some(query) = query_iq.get_child("query", ns::MAM) else {
        return vec![];
    };
    let query_id = query.attr("queryid").unwrap_or_default();

    let mut responses = results
        .iter()
        .map(|(archive_id, message)| {
            Element::from_str(&format!(
                r#"<message xmlns="jabber:client" to="test@prose.org/test">
                    <result xmlns="urn:xmpp:mam:2" queryid="{query_id}" id="{archive_id}">
                        <forwarded xmlns="urn:xmpp:forward:0">
                            <delay xmlns="urn:xmpp:delay" stamp="2023-12-24T18:00:00Z"/>
                            {message}
                        </forwarded>
                    </result>
                </message>"#
            ))
            .unwrap()
        })
        .collect::<Vec<_>>();

    let set = match (results.first(), results.last()) {
        (Some((first, _)), Some((last, _))) => format!(
            r#"<set xmlns="http://jabber.org/protocol/rsm"><first>{first}</first><last>{last}</last></set>"#
        ),
        _ => r#"<set xmlns="http://jabber.org/protocol/rsm"/>"#.to_string(),
    };

    responses.push(
        Element::from_str(&format!(
            r#"<iq xmlns="jabber:client" type="result" id="{}"><fin xmlns="urn:xmpp:mam:2" complete="{complete}">{set}</fin></iq>"#,
            query_iq.attr("id").unwrap_or_default()
        ))
        .unwrap(),
    );
    responses
}

/// Serves a single archived chat message for every archive query.
fn archive_server(stanza: &Element) -> Vec<Element> {
    archive_response(stanza, &[("archive-1", CHRISTMAS_GREETING)], true)
}

/// The RSM values (`after`, `before`) of all archive queries the client sent.
fn sent_rsm_values(client: &ConnectedClient, name: &str) -> Vec<Option<String>> {
    client
        .sent_stanzas()
        .iter()
        .filter_map(|stanza| stanza.get_child("query", ns::MAM))
        .map(|query| {
            query
                .get_child("set", ns::RSM)
                .and_then(|set| set.get_child(name, ns::RSM))
                .map(|value| value.text())
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_archived_messages_are_not_duplicated() -> Result<()> {
    let client = Client::connected_client().await?;
    client.server.set_stanza_handler(archive_server);

    let mam = client.get_mod::<mods::MAM>();

    let page = mam.load_initial().await?;
    assert_eq!(page.messages.len(), 1);
    assert!(page.complete);
    assert_eq!(page.last.as_deref(), Some("archive-1"));

    let message = &page.messages[0];
    assert_eq!(message.id, "m1");
    assert_eq!(message.stanza_id.as_deref(), Some("archive-1"));
    assert!(message.from_archive);
    assert!(message.delayed);
    assert!(!message.outgoing);

    let page = mam.backfill_contact(&BareJid::theirs()).await?;
    assert!(page.messages.is_empty());
    assert_eq!(
        sent_rsm_values(&client, "after"),
        vec![None, Some("archive-1".to_string())]
    );

    let stored = client
        .client
        .messages_with(&BareJid::theirs())
        .map(|messages| messages.len());
    assert_eq!(stored, Some(1));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_backfill_after_sending_only_uses_archive_ids() -> Result<()> {
    let client = Client::connected_client().await?;

    let sent_id = client
        .get_mod::<mods::Chat>()
        .send_message(&BareJid::theirs(), "hi")?;

    // The archive returns our own message, identified by its origin-id.
    let archived_copy = format!(
        r#"<message xmlns="jabber:client" type="chat" id="{sent_id}" from="test@prose.org/test" to="friend@prose.org">
            <body>hi</body>
            <origin-id xmlns="urn:xmpp:sid:0" id="{sent_id}"/>
        </message>"#
    );
    client.server.set_stanza_handler(move |stanza| {
        archive_response(stanza, &[("archive-1", archived_copy.as_str())], true)
    });

    let mam = client.get_mod::<mods::MAM>();

    let page = mam.backfill_contact(&BareJid::theirs()).await?;
    assert!(page.messages.is_empty());

    mam.backfill_contact(&BareJid::theirs()).await?;

    assert_eq!(
        sent_rsm_values(&client, "after"),
        vec![None, Some("archive-1".to_string())]
    );

    let messages = client
        .client
        .messages_with(&BareJid::theirs())
        .map(|messages| messages.messages().to_vec())
        .unwrap_or_default();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, sent_id);
    assert_eq!(messages[0].stanza_id.as_deref(), Some("archive-1"));
    assert!(messages[0].outgoing);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_live_message_is_not_stored_again_from_archive() -> Result<()> {
    let client = Client::connected_client().await?;

    client
        .receive_stanza(Element::from_str(CHRISTMAS_GREETING)?)
        .await;
    client.server.set_stanza_handler(archive_server);

    let page = client
        .get_mod::<mods::MAM>()
        .backfill_contact(&BareJid::theirs())
        .await?;
    assert!(page.messages.is_empty());

    let stored = client
        .client
        .messages_with(&BareJid::theirs())
        .map(|messages| messages.len());
    assert_eq!(stored, Some(1));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_full_history_pages_backward_until_complete() -> Result<()> {
    let client = Client::connected_client().await?;

    client.server.set_stanza_handler(|stanza| {
        let before = stanza
            .get_child("query", ns::MAM)
            .and_then(|query| query.get_child("set", ns::RSM))
            .and_then(|set| set.get_child("before", ns::RSM))
            .map(|before| before.text());

        match before.as_deref() {
            Some("") => archive_response(
                stanza,
                &[(
                    "archive-2",
                    r#"<message xmlns="jabber:client" type="chat" id="m2" from="friend@prose.org/phone" to="test@prose.org/test"><body>Second</body></message>"#,
                )],
                false,
            ),
            Some("archive-2") => archive_response(
                stanza,
                &[(
                    "archive-1",
                    r#"<message xmlns="jabber:client" type="chat" id="m1" from="friend@prose.org/phone" to="test@prose.org/test"><body>First</body></message>"#,
                )],
                true,
            ),
            _ => archive_response(stanza, &[], true),
        }
    });

    let messages = client
        .get_mod::<mods::MAM>()
        .load_full_history(None, Some(&BareJid::theirs()))
        .await?;

    assert_eq!(
        messages
            .iter()
            .map(|message| message.body.as_str())
            .collect::<Vec<_>>(),
        vec!["First", "Second"]
    );
    assert_eq!(
        sent_rsm_values(&client, "before"),
        vec![Some("".to_string()), Some("archive-2".to_string())]
    );
    assert_eq!(sent_rsm_values(&client, "after"), vec![None, None]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_ignores_results_of_other_queries() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    server.set_stanza_handler(|stanza| {
        let mut responses = archive_server(stanza);
        if let Some(result) = responses.first_mut() {
            if let Some(result) = result.get_child_mut("result", ns::MAM) {
                result.set_attr("queryid", "someone-elses-query");
            }
        }
        responses
    });

    let page = client.get_mod::<mods::MAM>().load_initial().await?;
    assert!(page.messages.is_empty());
    assert!(client.conversations().is_empty());

    Ok(())
}
