// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

// Streams & core

pub const JABBER_CLIENT: &str = "jabber:client";
pub const STREAM: &str = "http://etherx.jabber.org/streams";
pub const XMPP_STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
pub const FRAMING: &str = "urn:ietf:params:xml:ns:xmpp-framing";
pub const HTTPBIND: &str = "http://jabber.org/protocol/httpbind";
pub const BOSH: &str = "urn:xmpp:xbosh";
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// XEP-0078: Non-SASL Authentication
pub const AUTH: &str = "jabber:iq:auth";
pub const AUTH_FEATURE: &str = "http://jabber.org/features/iq-auth";

/// XEP-0077: In-Band Registration
pub const REGISTER: &str = "jabber:iq:register";
pub const REGISTER_FEATURE: &str = "http://jabber.org/features/iq-register";

// Roster

pub const ROSTER: &str = "jabber:iq:roster";
pub const ROSTER_X: &str = "jabber:x:roster";

// XEP-0045: Multi-User Chat

pub const MUC: &str = "http://jabber.org/protocol/muc";
pub const MUC_USER: &str = "http://jabber.org/protocol/muc#user";
pub const MUC_ADMIN: &str = "http://jabber.org/protocol/muc#admin";
pub const MUC_OWNER: &str = "http://jabber.org/protocol/muc#owner";
pub const MUC_ROOMCONFIG: &str = "http://jabber.org/protocol/muc#roomconfig";
pub const MUC_REQUEST: &str = "http://jabber.org/protocol/muc#request";
pub const MUC_ROOMINFO: &str = "http://jabber.org/protocol/muc#roominfo";

/// XEP-0249: Direct MUC Invitations
pub const CONFERENCE: &str = "jabber:x:conference";

// MUC/Sub (ejabberd)

pub const MUCSUB: &str = "urn:xmpp:mucsub:0";
pub const MUCSUB_NODES_MESSAGES: &str = "urn:xmpp:mucsub:nodes:messages";
pub const MUCSUB_NODES_PRESENCE: &str = "urn:xmpp:mucsub:nodes:presence";
pub const MUCSUB_NODES_SUBJECT: &str = "urn:xmpp:mucsub:nodes:subject";
pub const MUCSUB_NODES_AFFILIATIONS: &str = "urn:xmpp:mucsub:nodes:affiliations";
pub const MUCSUB_NODES_SUBSCRIBERS: &str = "urn:xmpp:mucsub:nodes:subscribers";

// Messaging

/// XEP-0313: Message Archive Management
pub const MAM: &str = "urn:xmpp:mam:2";
/// XEP-0059: Result Set Management
pub const RSM: &str = "http://jabber.org/protocol/rsm";
/// XEP-0280: Message Carbons
pub const CARBONS: &str = "urn:xmpp:carbons:2";
/// XEP-0297: Stanza Forwarding
pub const FORWARD: &str = "urn:xmpp:forward:0";
/// XEP-0203: Delayed Delivery
pub const DELAY: &str = "urn:xmpp:delay";
/// XEP-0359: Unique and Stable Stanza IDs
pub const SID: &str = "urn:xmpp:sid:0";

/// XEP-0191: Blocking Command
pub const BLOCKING: &str = "urn:xmpp:blocking";

// XEP-0060: Publish-Subscribe

pub const PUBSUB: &str = "http://jabber.org/protocol/pubsub";
pub const PUBSUB_OWNER: &str = "http://jabber.org/protocol/pubsub#owner";
pub const PUBSUB_EVENT: &str = "http://jabber.org/protocol/pubsub#event";
pub const PUBSUB_PUBLISH_OPTIONS: &str = "http://jabber.org/protocol/pubsub#publish-options";
pub const PUBSUB_NODE_CONFIG: &str = "http://jabber.org/protocol/pubsub#node_config";

/// XEP-0048: Bookmarks
pub const BOOKMARKS: &str = "storage:bookmarks";
/// XEP-0402: PEP Native Bookmarks
pub const BOOKMARKS2: &str = "urn:xmpp:bookmarks:1";

/// XEP-0357: Push Notifications
pub const PUSH: &str = "urn:xmpp:push:0";
pub const PUSH_SUMMARY: &str = "urn:xmpp:push:summary";

/// XEP-0199: XMPP Ping
pub const PING: &str = "urn:xmpp:ping";
/// XEP-0202: Entity Time
pub const TIME: &str = "urn:xmpp:time";
/// XEP-0363: HTTP File Upload
pub const HTTP_UPLOAD: &str = "urn:xmpp:http:upload:0";

/// XEP-0004: Data Forms
pub const DATA_FORMS: &str = "jabber:x:data";

// XEP-0030: Service Discovery

pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
pub const DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";
