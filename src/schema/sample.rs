//! Bundled schema for the messaging-services warehouse
//!
//! Twelve dimensions and three facts. Services resolve couriers in three
//! roles and addresses as origin (`O-`) or destination (`D-`); incidents and
//! state changes resolve their service through `fact_servicios`.

/// Messaging-services warehouse schema
pub const SAMPLE_SCHEMA: &str = r#"# Messaging-services warehouse
[audit]
valid_from = "fecha_inicio_validez"
valid_to = "fecha_fin_validez"
is_current = "flag_registro_actual"
created = "fecha_creacion"
modified = "fecha_ultima_modificacion"

[[tables]]
name = "dimarea"
kind = "dimension"
primary_key = "dk_area"
business_keys = ["id_area_bdo"]
columns = [
    { name = "id_area_bdo", type = "text", nullable = false },
    { name = "nombre_area", type = "text" },
    { name = "descripcion", type = "text" },
]

[[tables]]
name = "dimtipocliente"
kind = "dimension"
primary_key = "dk_tipocliente"
business_keys = ["id_tipocliente_bdo"]
columns = [
    { name = "id_tipocliente_bdo", type = "text", nullable = false },
    { name = "nombre_tipo_cliente", type = "text" },
    { name = "descripcion", type = "text" },
]

[[tables]]
name = "dimciudad"
kind = "dimension"
primary_key = "dk_ciudad"
business_keys = ["id_ciudad_bdo"]
columns = [
    { name = "id_ciudad_bdo", type = "text", nullable = false },
    { name = "nombre_ciudad", type = "text" },
    { name = "nombre_departamento", type = "text" },
    { name = "id_departamento", type = "text" },
]

[[tables]]
name = "dimcliente"
kind = "dimension"
primary_key = "dk_cliente"
business_keys = ["id_cliente_bdo"]
columns = [
    { name = "id_cliente_bdo", type = "text", nullable = false },
    { name = "nit_cliente", type = "text" },
    { name = "nombre_cliente", type = "text" },
    { name = "email", type = "text" },
    { name = "direccion", type = "text" },
    { name = "telefono", type = "text" },
    { name = "nombre_contacto", type = "text" },
    { name = "id_ciudad_bdo", type = "integer" },
    { name = "id_tipocliente_bdo", type = "integer" },
    { name = "flag_activo", type = "boolean" },
    { name = "id_coordinador", type = "text" },
    { name = "sector", type = "text" },
]

[[tables]]
name = "dimsede"
kind = "dimension"
primary_key = "dk_sede"
business_keys = ["id_sede_bdo"]
columns = [
    { name = "id_sede_bdo", type = "text", nullable = false },
    { name = "nombre_sede", type = "text" },
    { name = "direccion", type = "text" },
    { name = "telefono", type = "text" },
    { name = "nombre_contacto", type = "text" },
    { name = "id_ciudad_bdo", type = "integer" },
    { name = "id_cliente_bdo", type = "integer" },
]

[[tables]]
name = "dimmensajero"
kind = "dimension"
primary_key = "dk_mensajero"
business_keys = ["id_mensajero_bdo"]
columns = [
    { name = "id_mensajero_bdo", type = "text", nullable = false },
    { name = "id_usuario", type = "text" },
    { name = "nombre", type = "text" },
    { name = "flag_activo", type = "boolean" },
    { name = "fecha_entrada", type = "timestamp" },
    { name = "fecha_salida", type = "timestamp" },
    { name = "salario", type = "double" },
    { name = "telefono", type = "text" },
    { name = "id_ciudad_bdo", type = "integer" },
    { name = "nombre_ciudad_operacion", type = "text" },
]

[[tables]]
name = "dimtiempo"
kind = "dimension"
primary_key = "dk_tiempo"
business_keys = ["fecha_completa"]
columns = [
    { name = "fecha_completa", type = "timestamp", nullable = false },
    { name = "anio", type = "integer" },
    { name = "semestre", type = "integer" },
    { name = "trimestre", type = "integer" },
    { name = "mes", type = "integer" },
    { name = "semana", type = "integer" },
    { name = "dia", type = "integer" },
    { name = "dia_semana", type = "integer" },
    { name = "es_fin_semana", type = "boolean" },
    { name = "es_feriado", type = "boolean" },
    { name = "hora", type = "integer" },
    { name = "minuto", type = "integer" },
    { name = "periodo_dia", type = "text" },
    { name = "anio_mes", type = "integer" },
]

[[tables]]
name = "dimusuario"
kind = "dimension"
primary_key = "dk_usuario"
business_keys = ["id_usuario_bdo"]
columns = [
    { name = "id_usuario_bdo", type = "text", nullable = false },
    { name = "id_user_sistema", type = "integer" },
    { name = "telefono", type = "text" },
    { name = "dk_area", type = "integer" },
    { name = "id_area_bdo", type = "text" },
    { name = "id_cliente_bdo", type = "integer" },
    { name = "nombre_cliente", type = "text" },
    { name = "id_sede_bdo", type = "integer" },
    { name = "nombre_sede", type = "text" },
    { name = "id_ciudad_bdo", type = "integer" },
    { name = "nombre_ciudad", type = "text" },
    { name = "flag_lider", type = "boolean" },
]

[[tables]]
name = "dimdireccion"
kind = "dimension"
primary_key = "dk_direccion"
business_keys = ["id_direccion_bdo"]
columns = [
    { name = "id_direccion_bdo", type = "text", nullable = false },
    { name = "direccion", type = "text" },
    { name = "id_ciudad_bdo", type = "integer" },
    { name = "nombre_ciudad", type = "text" },
    { name = "nombre_departamento", type = "text" },
    { name = "tipo_direccion", type = "text" },
]

[[tables]]
name = "dimtipopago"
kind = "dimension"
primary_key = "dk_tipopago"
business_keys = ["id_tipopago_bdo"]
columns = [
    { name = "id_tipopago_bdo", type = "text", nullable = false },
    { name = "nombre_tipopago", type = "text" },
    { name = "descripcion", type = "text" },
]

[[tables]]
name = "dimtipovehiculo"
kind = "dimension"
primary_key = "dk_tipovehiculo"
business_keys = ["id_tipovehiculo_bdo"]
columns = [
    { name = "id_tipovehiculo_bdo", type = "text", nullable = false },
    { name = "nombre_tipovehiculo", type = "text" },
    { name = "descripcion", type = "text" },
]

[[tables]]
name = "dimtiponovedad"
kind = "dimension"
primary_key = "dk_tiponovedad"
business_keys = ["id_tiponovedad_bdo"]
columns = [
    { name = "id_tiponovedad_bdo", type = "text", nullable = false },
    { name = "nombre_tiponovedad", type = "text" },
]

[[tables]]
name = "fact_servicios"
kind = "fact"
primary_key = "sk_servicio"
unique_columns = ["id_servicio_bdo"]
columns = [
    { name = "id_servicio_bdo", type = "text", nullable = false },
    { name = "id_tiempo_solicitado", type = "bigint" },
    { name = "id_tiempo_deseado", type = "bigint" },
    { name = "id_tiempo_actualizacion", type = "bigint" },
    { name = "estado_actual", type = "text" },
    { name = "tipo_servicio", type = "text" },
    { name = "descripcion_servicio", type = "text" },
    { name = "nombre_solicitante", type = "text" },
    { name = "nombre_recibe", type = "text" },
    { name = "telefono_recibe", type = "text" },
    { name = "descripcion_pago", type = "text" },
    { name = "flag_ida_y_regreso", type = "boolean" },
    { name = "prioridad", type = "text" },
    { name = "flag_multiples_origenes", type = "boolean" },
    { name = "tiempo_total_servicio_minutos", type = "double" },
    { name = "tiempo_asignacion_minutos", type = "double" },
    { name = "tiempo_entrega_minutos", type = "double" },
    { name = "flag_completado", type = "boolean" },
    { name = "flag_cancelado", type = "boolean" },
    { name = "flag_activo", type = "boolean" },
    { name = "flag_es_prueba", type = "boolean" },
]

[[tables.key_mappings]]
table = "dimcliente"
source_column = "id_cliente_bdo"
business_key = "id_cliente_bdo"
surrogate_key = "dk_cliente"
target_column = "dk_cliente"

[[tables.key_mappings]]
table = "dimusuario"
source_column = "id_usuario_bdo"
business_key = "id_usuario_bdo"
surrogate_key = "dk_usuario"
target_column = "dk_usuario"

[[tables.key_mappings]]
table = "dimmensajero"
source_column = "id_mensajero_principal_bdo"
business_key = "id_mensajero_bdo"
surrogate_key = "dk_mensajero"
target_column = "dk_mensajero_principal"

[[tables.key_mappings]]
table = "dimmensajero"
source_column = "id_mensajero_secundario_bdo"
business_key = "id_mensajero_bdo"
surrogate_key = "dk_mensajero"
target_column = "dk_mensajero_secundario"

[[tables.key_mappings]]
table = "dimmensajero"
source_column = "id_mensajero_terciario_bdo"
business_key = "id_mensajero_bdo"
surrogate_key = "dk_mensajero"
target_column = "dk_mensajero_terciario"

[[tables.key_mappings]]
table = "dimdireccion"
source_column = "id_direccion_origen_bdo"
business_key = "id_direccion_bdo"
surrogate_key = "dk_direccion"
target_column = "dk_direccion_origen"
role_prefix = "O-"

[[tables.key_mappings]]
table = "dimdireccion"
source_column = "id_direccion_destino_bdo"
business_key = "id_direccion_bdo"
surrogate_key = "dk_direccion"
target_column = "dk_direccion_destino"
role_prefix = "D-"

[[tables.key_mappings]]
table = "dimtipopago"
source_column = "id_tipopago_bdo"
business_key = "id_tipopago_bdo"
surrogate_key = "dk_tipopago"
target_column = "dk_tipopago"

[[tables.key_mappings]]
table = "dimtipovehiculo"
source_column = "id_tipovehiculo_bdo"
business_key = "id_tipovehiculo_bdo"
surrogate_key = "dk_tipovehiculo"
target_column = "dk_tipovehiculo"

[[tables]]
name = "fact_estados_servicio"
kind = "fact"
primary_key = "sk_estado_servicio"
unique_columns = ["id_estado_servicio_bdo"]
columns = [
    { name = "id_estado_servicio_bdo", type = "text", nullable = false },
    { name = "id_tiempo", type = "bigint" },
    { name = "estado_nombre", type = "text" },
    { name = "observaciones", type = "text" },
    { name = "flag_tiene_foto", type = "boolean" },
    { name = "flag_es_prueba", type = "boolean" },
    { name = "duracion_estado_minutos", type = "double" },
]

[[tables.key_mappings]]
table = "fact_servicios"
source_column = "id_servicio_bdo"
business_key = "id_servicio_bdo"
surrogate_key = "sk_servicio"
target_column = "sk_servicio"

[[tables]]
name = "fact_novedades"
kind = "fact"
primary_key = "sk_novedad"
unique_columns = ["id_novedad_bdo"]
columns = [
    { name = "id_novedad_bdo", type = "text", nullable = false },
    { name = "id_tiempo", type = "bigint" },
    { name = "descripcion", type = "text" },
    { name = "flag_es_prueba", type = "boolean" },
    { name = "nombre_tipo_novedad", type = "text" },
]

[[tables.key_mappings]]
table = "fact_servicios"
source_column = "id_servicio_bdo"
business_key = "id_servicio_bdo"
surrogate_key = "sk_servicio"
target_column = "sk_servicio"

[[tables.key_mappings]]
table = "dimtiponovedad"
source_column = "id_tiponovedad_bdo"
business_key = "id_tiponovedad_bdo"
surrogate_key = "dk_tiponovedad"
target_column = "dk_tiponovedad"

[[tables.key_mappings]]
table = "dimmensajero"
source_column = "id_mensajero_bdo"
business_key = "id_mensajero_bdo"
surrogate_key = "dk_mensajero"
target_column = "dk_mensajero"
"#;

/// Bundled messaging-services schema as TOML
pub fn sample_schema() -> &'static str {
    SAMPLE_SCHEMA
}
