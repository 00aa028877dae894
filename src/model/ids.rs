id_type!(
    /// Stable identifier of a nation. Never reused after disband.
    NationId,
    "nation"
);

id_type!(
    /// Opaque player identifier supplied by the host platform.
    PlayerId,
    "player"
);

id_type!(WarId, "war");

id_type!(TradeId, "trade");
