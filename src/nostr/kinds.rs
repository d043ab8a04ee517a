//! Event kinds the policy layer cares about

/// NIP-29 chat message inside a group
pub const GROUP_CHAT_MESSAGE: u16 = 9;
/// NIP-59 gift wrap (authorized by recipient)
pub const GIFT_WRAP: u16 = 1059;
/// NIP-57 zap receipt (authorized by recipient)
pub const ZAP_RECEIPT: u16 = 9735;

pub const GROUP_PUT_USER: u16 = 9000;
pub const GROUP_REMOVE_USER: u16 = 9001;
pub const GROUP_EDIT_METADATA: u16 = 9002;
pub const GROUP_DELETE_EVENT: u16 = 9005;
pub const GROUP_CREATE_GROUP: u16 = 9007;
pub const GROUP_DELETE_GROUP: u16 = 9008;
pub const GROUP_JOIN_REQUEST: u16 = 9021;
pub const GROUP_LEAVE_REQUEST: u16 = 9022;

/// NIP-51 simple group list, used when migrating legacy groups
pub const SIMPLE_GROUP_LIST: u16 = 10009;

/// Relay-level join carrying a `claim` tag
pub const AUTH_JOIN: u16 = 28934;
/// Relay-generated invite carrying a fresh `claim` tag
pub const AUTH_INVITE: u16 = 28935;

pub const GROUP_METADATA: u16 = 39000;
pub const GROUP_ADMINS: u16 = 39001;
pub const GROUP_MEMBERS: u16 = 39002;
pub const GROUP_ROLES: u16 = 39003;

/// Kinds authorized by their `p`-tagged recipient instead of their author
pub const RECIPIENT_AUTH: [u16; 2] = [ZAP_RECEIPT, GIFT_WRAP];

/// Kinds only the relay may produce
pub const GENERATED: [u16; 4] = [GROUP_METADATA, GROUP_ADMINS, GROUP_MEMBERS, GROUP_ROLES];

/// Moderation kinds reserved to relay admins
pub const GROUP_ADMIN: [u16; 6] = [
    GROUP_PUT_USER,
    GROUP_REMOVE_USER,
    GROUP_EDIT_METADATA,
    GROUP_DELETE_EVENT,
    GROUP_CREATE_GROUP,
    GROUP_DELETE_GROUP,
];

pub const GROUP_REQUEST: [u16; 2] = [GROUP_JOIN_REQUEST, GROUP_LEAVE_REQUEST];

/// Kinds that change group existence or metadata
pub const GROUP_LIFECYCLE: [u16; 3] = [GROUP_CREATE_GROUP, GROUP_EDIT_METADATA, GROUP_DELETE_GROUP];

pub const GROUP_MEMBERSHIP: [u16; 2] = [GROUP_PUT_USER, GROUP_REMOVE_USER];

pub fn is_recipient_auth(kind: u16) -> bool {
    RECIPIENT_AUTH.contains(&kind)
}

pub fn is_generated(kind: u16) -> bool {
    GENERATED.contains(&kind)
}

pub fn is_group_admin(kind: u16) -> bool {
    GROUP_ADMIN.contains(&kind)
}

pub fn is_group_request(kind: u16) -> bool {
    GROUP_REQUEST.contains(&kind)
}

pub fn is_group_lifecycle(kind: u16) -> bool {
    GROUP_LIFECYCLE.contains(&kind)
}
