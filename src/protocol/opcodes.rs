//! Game protocol opcode names
//!
//! Used for logging only. Unknown opcodes are relayed like any other.

use std::fmt;

/// Client talk packet
pub const CLIENT_TALK: u8 = 0x96;

/// Server talk packet
pub const SERVER_TALK: u8 = 0xAA;

/// Game server challenge, sent unencrypted before the client's first message
pub const SERVER_CHALLENGE: u8 = 0x1F;

/// Which peer originated a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to real server
    Upstream,
    /// Real server to client
    Downstream,
}

impl Direction {
    pub fn opcode_name(self, opcode: u8) -> Option<&'static str> {
        match self {
            Direction::Upstream => client_opcode_name(opcode),
            Direction::Downstream => server_opcode_name(opcode),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Upstream => "client->server",
            Direction::Downstream => "server->client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a client-originated opcode
pub fn client_opcode_name(opcode: u8) -> Option<&'static str> {
    let name = match opcode {
        0x01 => "EnterAccount",
        0x0A => "PendingGame",
        0x0F => "EnterGame",
        0x14 => "LeaveGame",
        0x1D => "Ping",
        0x1E => "PingBack",
        0x33 => "ChangeMapAwareRange",
        0x64 => "AutoWalk",
        0x65 => "WalkNorth",
        0x66 => "WalkEast",
        0x67 => "WalkSouth",
        0x68 => "WalkWest",
        0x69 => "Stop",
        0x6A => "WalkNorthEast",
        0x6B => "WalkSouthEast",
        0x6C => "WalkSouthWest",
        0x6D => "WalkNorthWest",
        0x6F => "TurnNorth",
        0x70 => "TurnEast",
        0x71 => "TurnSouth",
        0x72 => "TurnWest",
        0x77 => "EquipItem",
        0x78 => "Move",
        0x79 => "InspectNpcTrade",
        0x7A => "BuyItem",
        0x7B => "SellItem",
        0x7C => "CloseNpcTrade",
        0x7D => "RequestTrade",
        0x7E => "InspectTrade",
        0x7F => "AcceptTrade",
        0x80 => "RejectTrade",
        0x82 => "UseItem",
        0x83 => "UseItemWith",
        0x84 => "UseOnCreature",
        0x85 => "RotateItem",
        0x87 => "CloseContainer",
        0x88 => "UpContainer",
        0x89 => "EditText",
        0x8A => "EditList",
        0x8C => "Look",
        0x8D => "LookCreature",
        0x96 => "Talk",
        0x97 => "RequestChannels",
        0x98 => "JoinChannel",
        0x99 => "LeaveChannel",
        0x9A => "OpenPrivateChannel",
        0x9B => "OpenRuleViolation",
        0x9C => "CloseRuleViolation",
        0x9D => "CancelRuleViolation",
        0x9E => "CloseNpcChannel",
        0xA0 => "ChangeFightModes",
        0xA1 => "Attack",
        0xA2 => "Follow",
        0xA3 => "InviteToParty",
        0xA4 => "JoinParty",
        0xA5 => "RevokeInvitation",
        0xA6 => "PassLeadership",
        0xA7 => "LeaveParty",
        0xA8 => "ShareExperience",
        0xA9 => "DisbandParty",
        0xAA => "OpenOwnChannel",
        0xAB => "InviteToOwnChannel",
        0xAC => "ExcludeFromOwnChannel",
        0xBE => "CancelAttackAndFollow",
        0xC9 => "UpdateTile",
        0xCA => "RefreshContainer",
        0xCB => "BrowseField",
        0xCC => "SeekInContainer",
        0xD2 => "RequestOutfit",
        0xD3 => "ChangeOutfit",
        0xD4 => "Mount",
        0xDC => "AddVip",
        0xDD => "RemoveVip",
        0xDE => "EditVip",
        0xE6 => "BugReport",
        0xE7 => "RuleViolation",
        0xE8 => "DebugReport",
        0xEF => "TransferCoins",
        0xF0 => "RequestQuestLog",
        0xF1 => "RequestQuestLine",
        0xF2 => "NewRuleViolation",
        0xF3 => "RequestItemInfo",
        0xF4 => "MarketLeave",
        0xF5 => "MarketBrowse",
        0xF6 => "MarketCreate",
        0xF7 => "MarketCancel",
        0xF8 => "MarketAccept",
        0xF9 => "AnswerModalDialog",
        0xFA => "OpenStore",
        0xFB => "RequestStoreOffers",
        0xFC => "BuyStoreOffer",
        0xFD => "OpenTransactionHistory",
        0xFE => "RequestTransactionHistory",
        _ => return None,
    };
    Some(name)
}

/// Name of a server-originated opcode
pub fn server_opcode_name(opcode: u8) -> Option<&'static str> {
    let name = match opcode {
        0x0A => "LoginOrPendingState",
        0x0B => "GMActions",
        0x0F => "EnterGame",
        0x11 => "UpdateNeeded",
        0x14 => "LoginError",
        0x15 => "LoginAdvice",
        0x16 => "LoginWait",
        0x17 => "LoginSuccess",
        0x18 => "LoginToken",
        0x19 => "StoreButtonIndicators",
        0x1D => "PingBack",
        0x1E => "Ping",
        0x1F => "Challenge",
        0x28 => "Death",
        0x33 => "ChangeMapAwareRange",
        0x64 => "FullMap",
        0x65 => "MapTopRow",
        0x66 => "MapRightRow",
        0x67 => "MapBottomRow",
        0x68 => "MapLeftRow",
        0x69 => "UpdateTile",
        0x6A => "CreateOnMap",
        0x6B => "ChangeOnMap",
        0x6C => "DeleteOnMap",
        0x6D => "MoveCreature",
        0x6E => "OpenContainer",
        0x6F => "CloseContainer",
        0x70 => "CreateContainer",
        0x71 => "ChangeInContainer",
        0x72 => "DeleteInContainer",
        0x78 => "SetInventory",
        0x79 => "DeleteInventory",
        0x7A => "OpenNpcTrade",
        0x7B => "PlayerGoods",
        0x7C => "CloseNpcTrade",
        0x7D => "OwnTrade",
        0x7E => "CounterTrade",
        0x7F => "CloseTrade",
        0x82 => "Ambient",
        0x83 => "GraphicalEffect",
        0x84 => "TextEffect",
        0x85 => "MissleEffect",
        0x86 => "MarkCreature",
        0x87 => "Trappers",
        0x8C => "CreatureHealth",
        0x8D => "CreatureLight",
        0x8E => "CreatureOutfit",
        0x8F => "CreatureSpeed",
        0x90 => "CreatureSkull",
        0x91 => "CreatureParty",
        0x92 => "CreatureUnpass",
        0x93 => "CreatureMarks",
        0x94 => "PlayerHelpers",
        0x95 => "CreatureType",
        0x96 => "EditText",
        0x97 => "EditList",
        0x9C => "Blessings",
        0x9D => "Preset",
        0x9E => "PremiumTrigger",
        0x9F => "PlayerDataBasic",
        0xA0 => "PlayerData",
        0xA1 => "PlayerSkills",
        0xA2 => "PlayerState",
        0xA3 => "ClearTarget",
        0xA4 => "SpellDelay",
        0xA5 => "SpellGroupDelay",
        0xA6 => "MultiUseDelay",
        0xA7 => "PlayerModes",
        0xA8 => "SetStoreDeepLink",
        0xAA => "Talk",
        0xAB => "Channels",
        0xAC => "OpenChannel",
        0xAD => "OpenPrivateChannel",
        0xAE => "RuleViolationChannel",
        0xAF => "RuleViolationRemove",
        0xB0 => "RuleViolationCancel",
        0xB1 => "RuleViolationLock",
        0xB2 => "OpenOwnChannel",
        0xB3 => "CloseChannel",
        0xB4 => "TextMessage",
        0xB5 => "CancelWalk",
        0xB6 => "WalkWait",
        0xB7 => "UnjustifiedStats",
        0xB8 => "PvpSituations",
        0xBE => "FloorChangeUp",
        0xBF => "FloorChangeDown",
        0xC8 => "ChooseOutfit",
        0xD2 => "VipAdd",
        0xD3 => "VipState",
        0xD4 => "VipLogout",
        0xDC => "TutorialHint",
        0xDD => "AutomapFlag",
        0xDF => "CoinBalance",
        0xE0 => "StoreError",
        0xE1 => "RequestPurchaseData",
        0xF0 => "QuestLog",
        0xF1 => "QuestLine",
        0xF2 => "CoinBalanceUpdate",
        0xF3 => "ChannelEvent",
        0xF4 => "ItemInfo",
        0xF5 => "PlayerInventory",
        0xF6 => "MarketEnter",
        0xF7 => "MarketLeave",
        0xF8 => "MarketDetail",
        0xF9 => "MarketBrowse",
        0xFA => "ModalDialog",
        0xFB => "Store",
        0xFC => "StoreOffers",
        0xFD => "StoreTransactionHistory",
        0xFE => "StoreCompletePurchase",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_talk_opcodes() {
        assert_eq!(client_opcode_name(CLIENT_TALK), Some("Talk"));
        assert_eq!(server_opcode_name(SERVER_TALK), Some("Talk"));
        assert_eq!(server_opcode_name(SERVER_CHALLENGE), Some("Challenge"));
    }

    #[test]
    fn test_tables_are_direction_specific() {
        // 0xAA means different things each way
        assert_eq!(Direction::Upstream.opcode_name(0xAA), Some("OpenOwnChannel"));
        assert_eq!(Direction::Downstream.opcode_name(0xAA), Some("Talk"));
        assert_eq!(Direction::Upstream.opcode_name(0x96), Some("Talk"));
        assert_eq!(Direction::Downstream.opcode_name(0x96), Some("EditText"));
    }

    #[test]
    fn test_unknown_opcodes() {
        assert_eq!(client_opcode_name(0x00), None);
        assert_eq!(server_opcode_name(0xFF), None);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Upstream.to_string(), "client->server");
        assert_eq!(Direction::Downstream.to_string(), "server->client");
    }
}
